//! Poll endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use huddle_common::AppResult;
use huddle_core::PollResults;
use serde::Deserialize;
use validator::Validate;

use crate::{
    extractors::{AuthUser, MaybeAuthUser},
    middleware::AppState,
    response::ApiResponse,
};

/// Vote request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[validate(range(min = 0))]
    pub option_index: i32,
}

/// Get poll results.
async fn show_poll(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<PollResults>> {
    let viewer_id = viewer.map(|p| p.id);
    let results = state
        .poll_service
        .results(&id, viewer_id.as_deref())
        .await?;

    Ok(ApiResponse::ok(results))
}

/// Vote on a poll, replacing any earlier vote.
async fn vote(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<PollResults>> {
    req.validate()?;

    state
        .poll_service
        .vote(&user.id, &id, req.option_index)
        .await?;

    // Return the results the voter now sees
    let results = state.poll_service.results(&id, Some(&user.id)).await?;
    Ok(ApiResponse::ok(results))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(show_poll))
        .route("/{id}/vote", post(vote))
}
