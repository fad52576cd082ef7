//! Chat message repository.

use std::sync::Arc;

use crate::entities::message::{self, ActiveModel, Column, Entity as Message};
use crate::entities::{Profile, profile};
use huddle_common::{AppError, AppResult};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder};

/// A message joined with its author's profile.
pub type MessageWithAuthor = (message::Model, Option<profile::Model>);

/// Repository for chat message operations.
#[derive(Clone)]
pub struct MessageRepository {
    db: Arc<DatabaseConnection>,
}

impl MessageRepository {
    /// Create a new message repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new message.
    pub async fn create(&self, model: ActiveModel) -> AppResult<message::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a message by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<message::Model>> {
        Message::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a message by ID together with its author.
    pub async fn find_with_author(&self, id: &str) -> AppResult<Option<MessageWithAuthor>> {
        Message::find_by_id(id)
            .find_also_related(Profile)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Load every message with its author, oldest first.
    pub async fn find_all_with_authors(&self) -> AppResult<Vec<MessageWithAuthor>> {
        Message::find()
            .find_also_related(Profile)
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a message by ID, returning the number of removed rows.
    pub async fn delete(&self, id: &str) -> AppResult<u64> {
        let result = Message::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }
}
