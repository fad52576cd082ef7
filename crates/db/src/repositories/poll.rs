//! Poll repository.

use std::sync::Arc;

use crate::entities::{Poll, PollVote, Profile, poll, poll_vote, profile};
use chrono::{DateTime, Utc};
use huddle_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::OnConflict,
};

/// A poll joined with its author's profile.
pub type PollWithAuthor = (poll::Model, Option<profile::Model>);

/// Poll repository for database operations.
#[derive(Clone)]
pub struct PollRepository {
    db: Arc<DatabaseConnection>,
}

impl PollRepository {
    /// Create a new poll repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a poll by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<poll::Model>> {
        Poll::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a poll by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<poll::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::PollNotFound(id.to_string()))
    }

    /// Find a poll by ID together with its author.
    pub async fn find_with_author(&self, id: &str) -> AppResult<Option<PollWithAuthor>> {
        Poll::find_by_id(id)
            .find_also_related(Profile)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Load every poll with its author, oldest first.
    pub async fn find_all_with_authors(&self) -> AppResult<Vec<PollWithAuthor>> {
        Poll::find()
            .find_also_related(Profile)
            .order_by_asc(poll::Column::CreatedAt)
            .order_by_asc(poll::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new poll.
    pub async fn create(&self, model: poll::ActiveModel) -> AppResult<poll::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

/// Poll vote repository for database operations.
#[derive(Clone)]
pub struct PollVoteRepository {
    db: Arc<DatabaseConnection>,
}

impl PollVoteRepository {
    /// Create a new poll vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Record a vote, replacing any earlier vote by the same voter.
    ///
    /// Relies on the unique (`poll_id`, `user_id`) index: a second vote for
    /// the pair updates the option and `updated_at` of the existing row.
    pub async fn upsert(
        &self,
        id: &str,
        poll_id: &str,
        user_id: &str,
        option_index: i32,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let model = poll_vote::ActiveModel {
            id: Set(id.to_string()),
            poll_id: Set(poll_id.to_string()),
            user_id: Set(user_id.to_string()),
            option_index: Set(option_index),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        PollVote::insert(model)
            .on_conflict(
                OnConflict::columns([poll_vote::Column::PollId, poll_vote::Column::UserId])
                    .update_columns([poll_vote::Column::OptionIndex, poll_vote::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Get all votes for a poll.
    pub async fn find_by_poll(&self, poll_id: &str) -> AppResult<Vec<poll_vote::Model>> {
        PollVote::find()
            .filter(poll_vote::Column::PollId.eq(poll_id))
            .order_by_asc(poll_vote::Column::UpdatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
