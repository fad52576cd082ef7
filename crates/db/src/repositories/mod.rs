//! Database repositories.

mod message;
mod poll;
mod profile;

pub use message::{MessageRepository, MessageWithAuthor};
pub use poll::{PollRepository, PollVoteRepository, PollWithAuthor};
pub use profile::ProfileRepository;
