//! Database entities.

#![allow(missing_docs)]

pub mod message;
pub mod poll;
pub mod poll_vote;
pub mod profile;

pub use message::Entity as Message;
pub use poll::Entity as Poll;
pub use poll_vote::Entity as PollVote;
pub use profile::Entity as Profile;
