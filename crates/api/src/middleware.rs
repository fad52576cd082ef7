//! API middleware.

#![allow(missing_docs)]

use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use huddle_core::{ChangeSubscriberService, ChatService, FeedService, PollService, ProfileService};
use tracing::debug;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: ChatService,
    pub poll_service: PollService,
    pub feed_service: FeedService,
    pub profile_service: ProfileService,
    pub subscriber: ChangeSubscriberService,
}

/// Authentication middleware.
///
/// Resolves `Authorization: Bearer <token>` to a profile and stores it in the
/// request extensions. Unknown tokens leave the request anonymous.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get(AUTHORIZATION)
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        match state.profile_service.authenticate_by_token(token).await {
            Ok(profile) => {
                req.extensions_mut().insert(profile);
            }
            Err(e) => debug!(error = %e, "Bearer token rejected"),
        }
    }

    next.run(req).await
}
