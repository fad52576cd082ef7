//! API endpoints.

mod chat;
mod polls;

use axum::Router;

use crate::middleware::AppState;
use crate::sse;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/chat", chat::router())
        .nest("/polls", polls::router())
        .nest("/streaming/sse", sse::router())
}
