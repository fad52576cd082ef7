//! Profile service.

use huddle_common::{AppError, AppResult};
use huddle_db::{entities::profile, repositories::ProfileRepository};

/// Profile service for identifying team members.
#[derive(Clone)]
pub struct ProfileService {
    profile_repo: ProfileRepository,
}

impl ProfileService {
    /// Create a new profile service.
    #[must_use]
    pub const fn new(profile_repo: ProfileRepository) -> Self {
        Self { profile_repo }
    }

    /// Resolve a bearer token to its profile.
    pub async fn authenticate_by_token(&self, token: &str) -> AppResult<profile::Model> {
        self.profile_repo
            .find_by_token(token)
            .await?
            .ok_or(AppError::Unauthorized)
    }
}
