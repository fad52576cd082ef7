//! Business logic services.

#![allow(missing_docs)]

pub mod change_feed;
pub mod chat;
pub mod chat_item;
pub mod feed;
pub mod feed_session;
pub mod feed_source;
pub mod poll;
pub mod profile;

#[cfg(test)]
mod testing;

pub use change_feed::{
    ChangeEvent, ChangeSubscriber, ChangeSubscriberService, ChangeSubscription, Delivery,
    EventPublisher, EventPublisherService, LocalChangeBus, Topic,
};
pub use chat::{ChatService, CreatePollInput, SendMessageInput};
pub use chat_item::{ChatItem, ChatMessage, ChatPoll, ItemKind, MalformedRow, MediaKind, MediaRef, Profile};
pub use feed::{FeedReconciler, LookupTicket, MergedFeed, Observed};
pub use feed_session::{FeedHandle, FeedItems, FeedService};
pub use feed_source::{FeedSnapshot, FeedSource, FeedSourceService, RepositoryFeedSource};
pub use poll::{OptionTally, PollResults, PollService};
pub use profile::ProfileService;
