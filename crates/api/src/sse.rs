//! Server-Sent Events (SSE) for real-time updates.
//!
//! `/chat` streams the merged feed after every change, backed by a feed
//! session that lives exactly as long as the connection. `/polls/{id}`
//! streams fresh results whenever someone votes on that poll.

#![allow(missing_docs)]

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::stream::{self, Stream, StreamExt};
use huddle_common::{AppError, AppResult};
use huddle_core::{ChangeEvent, ChangeSubscription, ChatItem, Delivery, PollResults, PollService};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{extractors::MaybeAuthUser, middleware::AppState};

/// SSE event types.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SseEvent<'a> {
    /// Connection established.
    Connected,
    /// The whole merged feed, oldest first.
    Feed { items: &'a [ChatItem] },
    /// Current results of the watched poll.
    Poll { results: &'a PollResults },
}

impl SseEvent<'_> {
    fn to_event(&self) -> Event {
        Event::default()
            .json_data(self)
            .unwrap_or_else(|_| Event::default().data("error"))
    }
}

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(30))
        .text("ping")
}

/// Live merged feed.
///
/// The feed handle is owned by the response stream, so the session and its
/// change subscription are released when the client disconnects.
async fn chat_feed(
    State(state): State<AppState>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let handle = state.feed_service.open().await?;

    let updates = handle.into_stream().map(|items| {
        Ok::<_, Infallible>(
            SseEvent::Feed {
                items: items.as_slice(),
            }
            .to_event(),
        )
    });

    let initial = stream::once(async { Ok::<_, Infallible>(SseEvent::Connected.to_event()) });

    Ok(Sse::new(initial.chain(updates)).keep_alive(keep_alive()))
}

/// Re-reads a poll's results as votes arrive.
struct PollWatch {
    poll_service: PollService,
    poll_id: String,
    viewer_id: Option<String>,
    subscription: ChangeSubscription,
}

impl PollWatch {
    /// Wait for the next vote on the poll and read the new results.
    ///
    /// Returns `None` when the bus closes or the poll disappears.
    async fn next_results(&mut self) -> Option<PollResults> {
        loop {
            match self.subscription.recv().await {
                Delivery::Event(ChangeEvent::VoteChanged { poll_id, .. })
                    if poll_id == self.poll_id => {}
                Delivery::Event(_) => continue,
                Delivery::Lagged(skipped) => {
                    debug!(poll_id = %self.poll_id, skipped, "Poll stream lagged, re-reading");
                }
                Delivery::Closed => return None,
            }

            match self
                .poll_service
                .results(&self.poll_id, self.viewer_id.as_deref())
                .await
            {
                Ok(results) => return Some(results),
                Err(AppError::PollNotFound(_)) => return None,
                Err(e) => warn!(error = %e, poll_id = %self.poll_id, "Failed to read poll results"),
            }
        }
    }
}

/// Live results for one poll.
async fn poll_results(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before the first read so no vote falls in between
    let subscription = state.subscriber.subscribe().await?;
    let viewer_id = viewer.map(|p| p.id);
    let current = state
        .poll_service
        .results(&id, viewer_id.as_deref())
        .await?;

    let watch = PollWatch {
        poll_service: state.poll_service.clone(),
        poll_id: id,
        viewer_id,
        subscription,
    };

    let updates = stream::unfold(watch, |mut watch| async move {
        let results = watch.next_results().await?;
        Some((results, watch))
    })
    .map(|results| Ok::<_, Infallible>(SseEvent::Poll { results: &results }.to_event()));

    let initial = stream::iter([
        Ok(SseEvent::Connected.to_event()),
        Ok(SseEvent::Poll { results: &current }.to_event()),
    ]);

    Ok(Sse::new(initial.chain(updates)).keep_alive(keep_alive()))
}

/// Create SSE router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat", get(chat_feed))
        .route("/polls/{id}", get(poll_results))
}
