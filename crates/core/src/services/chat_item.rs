//! Chat feed items.
//!
//! Rows loaded through the repositories are converted here into the shapes
//! the feed works with. The joined author profile always arrives as a single
//! `Option<Profile>`, whatever query produced it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use huddle_db::entities::{message, poll, profile};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Minimum number of options a poll carries.
pub const MIN_POLL_OPTIONS: usize = 2;

/// Author information shown next to a chat item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

impl From<profile::Model> for Profile {
    fn from(model: profile::Model) -> Self {
        Self {
            id: model.id,
            full_name: model.full_name,
            avatar_url: model.avatar_url,
        }
    }
}

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Column value stored in `message.media_type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(other.to_string()),
        }
    }
}

/// Reference to uploaded media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub author_id: String,
    pub author: Option<Profile>,
    pub content: Option<String>,
    pub media: Option<MediaRef>,
    pub created_at: DateTime<Utc>,
}

/// A poll shared into the chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPoll {
    pub id: String,
    pub author_id: String,
    pub author: Option<Profile>,
    pub question: String,
    pub options: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Which collection an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    Message,
    Poll,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => f.write_str("message"),
            Self::Poll => f.write_str("poll"),
        }
    }
}

/// One entry of the merged feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChatItem {
    Message(ChatMessage),
    Poll(ChatPoll),
}

impl ChatItem {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Message(m) => &m.id,
            Self::Poll(p) => &p.id,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ItemKind {
        match self {
            Self::Message(_) => ItemKind::Message,
            Self::Poll(_) => ItemKind::Poll,
        }
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Message(m) => m.created_at,
            Self::Poll(p) => p.created_at,
        }
    }
}

impl From<ChatMessage> for ChatItem {
    fn from(message: ChatMessage) -> Self {
        Self::Message(message)
    }
}

impl From<ChatPoll> for ChatItem {
    fn from(poll: ChatPoll) -> Self {
        Self::Poll(poll)
    }
}

/// A stored row that cannot be shown in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRow {
    #[error("message {id} has neither content nor media")]
    EmptyMessage { id: String },

    #[error("message {id} has media without a media type")]
    MissingMediaKind { id: String },

    #[error("message {id} has unknown media type {kind:?}")]
    UnknownMediaKind { id: String, kind: String },

    #[error("poll {id} options are not a list of at least two labels")]
    InvalidPollOptions { id: String },
}

/// Parse the JSON `options` column of a poll.
///
/// Returns `None` unless the value is an array of at least two strings.
#[must_use]
pub fn parse_poll_options(value: &JsonValue) -> Option<Vec<String>> {
    let options: Vec<String> = serde_json::from_value(value.clone()).ok()?;
    (options.len() >= MIN_POLL_OPTIONS).then_some(options)
}

impl ChatMessage {
    /// Build a feed message from a row and its joined author.
    pub fn from_row(
        model: message::Model,
        author: Option<profile::Model>,
    ) -> Result<Self, MalformedRow> {
        let media = match (model.media_url, model.media_type) {
            (None, _) => None,
            (Some(_), None) => return Err(MalformedRow::MissingMediaKind { id: model.id }),
            (Some(url), Some(kind)) => {
                let kind = kind
                    .parse::<MediaKind>()
                    .map_err(|kind| MalformedRow::UnknownMediaKind {
                        id: model.id.clone(),
                        kind,
                    })?;
                Some(MediaRef { url, kind })
            }
        };

        let content = model.content.filter(|c| !c.trim().is_empty());
        if content.is_none() && media.is_none() {
            return Err(MalformedRow::EmptyMessage { id: model.id });
        }

        Ok(Self {
            id: model.id,
            author_id: model.user_id,
            author: author.map(Profile::from),
            content,
            media,
            created_at: model.created_at.with_timezone(&Utc),
        })
    }
}

impl ChatPoll {
    /// Build a feed poll from a row and its joined author.
    pub fn from_row(model: poll::Model, author: Option<profile::Model>) -> Result<Self, MalformedRow> {
        let Some(options) = parse_poll_options(&model.options) else {
            return Err(MalformedRow::InvalidPollOptions { id: model.id });
        };

        Ok(Self {
            id: model.id,
            author_id: model.created_by,
            author: author.map(Profile::from),
            question: model.question,
            options,
            created_at: model.created_at.with_timezone(&Utc),
        })
    }
}
