//! Read side of the chat feed.

use std::sync::Arc;

use async_trait::async_trait;
use huddle_common::AppResult;
use huddle_db::repositories::{MessageRepository, PollRepository};
use tracing::warn;

use super::chat_item::{ChatItem, ChatMessage, ChatPoll, ItemKind};

/// Result of a bulk load: both collections, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub messages: Vec<ChatMessage>,
    pub polls: Vec<ChatPoll>,
}

/// Where feed records come from.
///
/// Every record carries its author already joined in.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Load every message and poll.
    async fn fetch_all(&self) -> AppResult<FeedSnapshot>;

    /// Read one message by id.
    async fn fetch_message(&self, id: &str) -> AppResult<Option<ChatMessage>>;

    /// Read one poll by id.
    async fn fetch_poll(&self, id: &str) -> AppResult<Option<ChatPoll>>;

    /// Read one item of either kind.
    async fn fetch_item(&self, kind: ItemKind, id: &str) -> AppResult<Option<ChatItem>> {
        match kind {
            ItemKind::Message => Ok(self.fetch_message(id).await?.map(ChatItem::from)),
            ItemKind::Poll => Ok(self.fetch_poll(id).await?.map(ChatItem::from)),
        }
    }
}

/// Wrapper for boxed `FeedSource` trait object.
pub type FeedSourceService = Arc<dyn FeedSource>;

/// Feed source backed by the database repositories.
#[derive(Clone)]
pub struct RepositoryFeedSource {
    message_repo: MessageRepository,
    poll_repo: PollRepository,
}

impl RepositoryFeedSource {
    #[must_use]
    pub const fn new(message_repo: MessageRepository, poll_repo: PollRepository) -> Self {
        Self {
            message_repo,
            poll_repo,
        }
    }
}

#[async_trait]
impl FeedSource for RepositoryFeedSource {
    async fn fetch_all(&self) -> AppResult<FeedSnapshot> {
        let message_rows = self.message_repo.find_all_with_authors().await?;
        let poll_rows = self.poll_repo.find_all_with_authors().await?;

        let messages = message_rows
            .into_iter()
            .filter_map(|(row, author)| {
                ChatMessage::from_row(row, author)
                    .map_err(|e| warn!(error = %e, "Skipping malformed message row"))
                    .ok()
            })
            .collect();

        let polls = poll_rows
            .into_iter()
            .filter_map(|(row, author)| {
                ChatPoll::from_row(row, author)
                    .map_err(|e| warn!(error = %e, "Skipping malformed poll row"))
                    .ok()
            })
            .collect();

        Ok(FeedSnapshot { messages, polls })
    }

    async fn fetch_message(&self, id: &str) -> AppResult<Option<ChatMessage>> {
        let Some((row, author)) = self.message_repo.find_with_author(id).await? else {
            return Ok(None);
        };

        match ChatMessage::from_row(row, author) {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                Ok(None)
            }
        }
    }

    async fn fetch_poll(&self, id: &str) -> AppResult<Option<ChatPoll>> {
        let Some((row, author)) = self.poll_repo.find_with_author(id).await? else {
            return Ok(None);
        };

        match ChatPoll::from_row(row, author) {
            Ok(poll) => Ok(Some(poll)),
            Err(e) => {
                warn!(error = %e, "Dropping malformed poll");
                Ok(None)
            }
        }
    }
}
