//! Profile repository.

use std::sync::Arc;

use crate::entities::{Profile, profile};
use huddle_common::{AppError, AppResult};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

/// Profile repository for database operations.
#[derive(Clone)]
pub struct ProfileRepository {
    db: Arc<DatabaseConnection>,
}

impl ProfileRepository {
    /// Create a new profile repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a profile by its bearer token.
    pub async fn find_by_token(&self, token: &str) -> AppResult<Option<profile::Model>> {
        Profile::find()
            .filter(profile::Column::Token.eq(token))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_profile(id: &str, token: Option<&str>) -> profile::Model {
        profile::Model {
            id: id.to_string(),
            full_name: "Sam Keeper".to_string(),
            avatar_url: None,
            token: token.map(String::from),
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_token_returns_profile() {
        let profile = create_test_profile("p1", Some("secret"));

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[profile]])
                .into_connection(),
        );

        let repo = ProfileRepository::new(db);
        let found = repo.find_by_token("secret").await.unwrap().unwrap();

        assert_eq!(found.id, "p1");
        assert_eq!(found.full_name, "Sam Keeper");
    }

    #[tokio::test]
    async fn test_find_by_unknown_token_is_none() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<profile::Model>::new()])
                .into_connection(),
        );

        let repo = ProfileRepository::new(db);
        assert!(repo.find_by_token("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_token_is_never_serialized() {
        let profile = create_test_profile("p1", Some("secret"));
        let json = serde_json::to_string(&profile).unwrap();

        assert!(!json.contains("secret"));
        assert!(json.contains("\"full_name\":\"Sam Keeper\""));
    }
}
