//! Core business logic for huddle.
//!
//! The centre of this crate is the feed reconciler in [`services::feed`],
//! which merges chat messages and polls into one ordered feed while change
//! events arrive from the realtime bus. [`services::feed_session`] drives a
//! reconciler for the lifetime of one connected view.

pub mod services;

pub use services::*;
