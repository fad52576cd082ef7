//! Realtime change distribution for huddle.
//!
//! Carries chat change events between server instances over Redis Pub/Sub.

pub mod pubsub;

pub use pubsub::{RedisPubSub, channel_name};
