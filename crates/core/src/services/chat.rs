//! Chat service: sending and deleting messages, sharing polls.

use chrono::Utc;
use huddle_common::{AppError, AppResult, IdGenerator};
use huddle_db::{
    entities::{message, poll},
    repositories::{MessageRepository, PollRepository},
};
use sea_orm::Set;
use serde_json::json;
use tracing::{info, warn};

use super::change_feed::{ChangeEvent, EventPublisherService};
use super::chat_item::{MIN_POLL_OPTIONS, MediaRef};

/// Maximum length of a poll question, in characters.
pub const MAX_QUESTION_LEN: usize = 200;
/// Maximum number of options on a poll.
pub const MAX_POLL_OPTIONS: usize = 10;
/// Maximum length of a poll option, in characters.
pub const MAX_OPTION_LEN: usize = 100;

/// Input for sending a message.
pub struct SendMessageInput {
    pub content: Option<String>,
    pub media: Option<MediaRef>,
}

/// Input for creating a poll.
pub struct CreatePollInput {
    pub question: String,
    pub options: Vec<String>,
}

/// Chat service.
#[derive(Clone)]
pub struct ChatService {
    message_repo: MessageRepository,
    poll_repo: PollRepository,
    event_publisher: Option<EventPublisherService>,
    id_gen: IdGenerator,
}

impl ChatService {
    /// Create a new chat service.
    #[must_use]
    pub const fn new(message_repo: MessageRepository, poll_repo: PollRepository) -> Self {
        Self {
            message_repo,
            poll_repo,
            event_publisher: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    /// Send a message to the team chat.
    pub async fn send_message(
        &self,
        author_id: &str,
        input: SendMessageInput,
    ) -> AppResult<message::Model> {
        let content = input
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        if content.is_none() && input.media.is_none() {
            return Err(AppError::Validation(
                "Message must have content or media".to_string(),
            ));
        }

        let (media_url, media_type) = match input.media {
            Some(MediaRef { url, kind }) => (Some(url), Some(kind.as_str().to_string())),
            None => (None, None),
        };

        let model = message::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(author_id.to_string()),
            content: Set(content),
            media_url: Set(media_url),
            media_type: Set(media_type),
            created_at: Set(Utc::now().into()),
        };

        let message = self.message_repo.create(model).await?;
        self.publish(ChangeEvent::MessageInserted {
            id: message.id.clone(),
        })
        .await;

        Ok(message)
    }

    /// Delete a message. Only its author may delete it.
    pub async fn delete_message(&self, requester_id: &str, message_id: &str) -> AppResult<()> {
        let message = self
            .message_repo
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::MessageNotFound(message_id.to_string()))?;

        if message.user_id != requester_id {
            return Err(AppError::Forbidden(
                "Cannot delete another member's message".to_string(),
            ));
        }

        self.message_repo.delete(message_id).await?;
        info!(message_id = %message_id, "Message deleted");

        self.publish(ChangeEvent::MessageDeleted {
            id: message_id.to_string(),
        })
        .await;

        Ok(())
    }

    /// Create a poll and share it into the chat.
    pub async fn create_poll(
        &self,
        author_id: &str,
        input: CreatePollInput,
    ) -> AppResult<poll::Model> {
        let question = input.question.trim().to_string();
        if question.is_empty() {
            return Err(AppError::Validation("Poll question is required".to_string()));
        }
        if question.chars().count() > MAX_QUESTION_LEN {
            return Err(AppError::Validation(format!(
                "Poll question is too long (max {MAX_QUESTION_LEN} chars)"
            )));
        }

        let options = normalize_options(input.options)?;

        let model = poll::ActiveModel {
            id: Set(self.id_gen.generate()),
            created_by: Set(author_id.to_string()),
            question: Set(question),
            options: Set(json!(options)),
            created_at: Set(Utc::now().into()),
        };

        let poll = self.poll_repo.create(model).await?;
        self.publish(ChangeEvent::PollInserted {
            id: poll.id.clone(),
        })
        .await;

        Ok(poll)
    }

    async fn publish(&self, event: ChangeEvent) {
        if let Some(ref event_publisher) = self.event_publisher
            && let Err(e) = event_publisher.publish(event).await
        {
            warn!(error = %e, "Failed to publish chat change event");
        }
    }
}

/// Trim the options, drop blank ones, and check the remaining list.
fn normalize_options(options: Vec<String>) -> AppResult<Vec<String>> {
    let options: Vec<String> = options
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();

    if options.len() < MIN_POLL_OPTIONS {
        return Err(AppError::Validation(format!(
            "Poll must have at least {MIN_POLL_OPTIONS} options"
        )));
    }
    if options.len() > MAX_POLL_OPTIONS {
        return Err(AppError::Validation(format!(
            "Poll cannot have more than {MAX_POLL_OPTIONS} options"
        )));
    }
    if options.iter().any(|o| o.chars().count() > MAX_OPTION_LEN) {
        return Err(AppError::Validation(format!(
            "Poll option is too long (max {MAX_OPTION_LEN} chars)"
        )));
    }

    Ok(options)
}
