//! Chat endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, post},
};
use huddle_common::{AppError, AppResult};
use huddle_core::{
    ChatItem, ChatMessage, ChatPoll, CreatePollInput, MediaKind, MediaRef, SendMessageInput,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    extractors::AuthUser,
    middleware::AppState,
    response::{ApiResponse, no_content},
};

/// Attached media.
#[derive(Debug, Deserialize, Validate)]
pub struct MediaRequest {
    #[validate(url)]
    pub url: String,
    pub kind: MediaKind,
}

/// Send message request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[validate(length(max = 4000))]
    pub content: Option<String>,

    #[validate(nested)]
    pub media: Option<MediaRequest>,
}

/// Create poll request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollRequest {
    #[validate(length(min = 1, max = 200))]
    pub question: String,

    pub options: Vec<String>,
}

/// Current merged feed, oldest first.
async fn feed(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<ChatItem>>> {
    let items = state.feed_service.snapshot().await?;
    Ok(ApiResponse::ok(items))
}

/// Send a message.
async fn send_message(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<ApiResponse<ChatMessage>> {
    req.validate()?;

    let input = SendMessageInput {
        content: req.content,
        media: req.media.map(|m| MediaRef {
            url: m.url,
            kind: m.kind,
        }),
    };

    let row = state.chat_service.send_message(&user.id, input).await?;
    let message =
        ChatMessage::from_row(row, Some(user)).map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(ApiResponse::created(message))
}

/// Delete one of the caller's messages.
async fn delete_message(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.chat_service.delete_message(&user.id, &id).await?;
    Ok(no_content())
}

/// Create a poll in the chat.
async fn create_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreatePollRequest>,
) -> AppResult<ApiResponse<ChatPoll>> {
    req.validate()?;

    let input = CreatePollInput {
        question: req.question,
        options: req.options,
    };

    let row = state.chat_service.create_poll(&user.id, input).await?;
    let poll =
        ChatPoll::from_row(row, Some(user)).map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(ApiResponse::created(poll))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/feed", get(feed))
        .route("/messages", post(send_message))
        .route("/messages/{id}", delete(delete_message))
        .route("/polls", post(create_poll))
}
