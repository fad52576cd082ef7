//! Change events and the bus contracts that carry them.
//!
//! Writers publish a [`ChangeEvent`] after every committed change to the
//! chat tables. Feed sessions hold a [`ChangeSubscription`] for as long as
//! their view is mounted. The Redis implementation lives in the realtime
//! crate; [`LocalChangeBus`] serves single-process deployments and tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use huddle_common::AppResult;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// A committed change to one of the chat tables.
///
/// Events carry identifiers only. Consumers read the full record by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChangeEvent {
    /// A message row was inserted.
    MessageInserted { id: String },
    /// A message row was deleted.
    MessageDeleted { id: String },
    /// A poll row was inserted.
    PollInserted { id: String },
    /// A voter cast or changed their vote on a poll.
    VoteChanged { poll_id: String, voter_id: String },
}

/// Table-level topic an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Messages,
    Polls,
    PollVotes,
}

impl Topic {
    /// Every topic, in a fixed order.
    pub const ALL: [Self; 3] = [Self::Messages, Self::Polls, Self::PollVotes];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::Polls => "polls",
            Self::PollVotes => "poll_votes",
        }
    }
}

impl ChangeEvent {
    /// Topic this event is published on.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::MessageInserted { .. } | Self::MessageDeleted { .. } => Topic::Messages,
            Self::PollInserted { .. } => Topic::Polls,
            Self::VoteChanged { .. } => Topic::PollVotes,
        }
    }
}

/// Trait for publishing change events.
///
/// This allows the core services to publish events
/// without directly depending on the realtime implementation.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one change event.
    async fn publish(&self, event: ChangeEvent) -> AppResult<()>;
}

/// Wrapper for boxed `EventPublisher` trait object.
pub type EventPublisherService = Arc<dyn EventPublisher>;

/// Result of waiting on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The next event.
    Event(ChangeEvent),
    /// The subscriber fell behind and this many events were dropped.
    Lagged(u64),
    /// The bus is gone; no further events will arrive.
    Closed,
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// What travels on a local bus.
#[derive(Debug, Clone)]
enum BusMessage {
    Event(ChangeEvent),
    /// An upstream source dropped this many events before they reached the bus.
    Lagged(u64),
}

/// An owned subscription to the change bus.
///
/// Released exactly once: either explicitly via [`ChangeSubscription::unsubscribe`]
/// or when dropped.
pub struct ChangeSubscription {
    rx: broadcast::Receiver<BusMessage>,
    release: Option<ReleaseFn>,
}

impl ChangeSubscription {
    fn with_release<F>(rx: broadcast::Receiver<BusMessage>, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            rx,
            release: Some(Box::new(release)),
        }
    }

    /// Wait for the next delivery.
    pub async fn recv(&mut self) -> Delivery {
        match self.rx.recv().await {
            Ok(BusMessage::Event(event)) => Delivery::Event(event),
            Ok(BusMessage::Lagged(n)) | Err(broadcast::error::RecvError::Lagged(n)) => {
                Delivery::Lagged(n)
            }
            Err(broadcast::error::RecvError::Closed) => Delivery::Closed,
        }
    }

    /// Release the subscription.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// Trait for opening subscriptions to the change bus.
#[async_trait]
pub trait ChangeSubscriber: Send + Sync {
    /// Subscribe to all chat topics.
    async fn subscribe(&self) -> AppResult<ChangeSubscription>;
}

/// Wrapper for boxed `ChangeSubscriber` trait object.
pub type ChangeSubscriberService = Arc<dyn ChangeSubscriber>;

/// In-process change bus backed by a broadcast channel.
#[derive(Clone)]
pub struct LocalChangeBus {
    tx: broadcast::Sender<BusMessage>,
    active: Arc<AtomicUsize>,
}

impl LocalChangeBus {
    /// Create a bus that buffers up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of subscriptions not yet released.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Tell every subscriber that `missed` events were lost upstream.
    ///
    /// Each subscription sees [`Delivery::Lagged`] in stream order, so feed
    /// sessions reload instead of silently missing changes.
    pub fn signal_lag(&self, missed: u64) {
        if self.tx.send(BusMessage::Lagged(missed)).is_err() {
            debug!(missed, "No local subscribers for lag signal");
        }
    }
}

impl Default for LocalChangeBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl EventPublisher for LocalChangeBus {
    async fn publish(&self, event: ChangeEvent) -> AppResult<()> {
        if self.tx.send(BusMessage::Event(event)).is_err() {
            debug!("No local subscribers for change event");
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeSubscriber for LocalChangeBus {
    async fn subscribe(&self) -> AppResult<ChangeSubscription> {
        self.active.fetch_add(1, Ordering::SeqCst);
        let active = Arc::clone(&self.active);
        Ok(ChangeSubscription::with_release(self.tx.subscribe(), move || {
            active.fetch_sub(1, Ordering::SeqCst);
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_change_event_serialization() {
        let event = ChangeEvent::VoteChanged {
            poll_id: "poll1".to_string(),
            voter_id: "user1".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"voteChanged\""));
        assert!(json.contains("\"poll_id\":\"poll1\""));

        let parsed: ChangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_topics() {
        assert_eq!(
            ChangeEvent::MessageDeleted { id: "m".to_string() }.topic(),
            Topic::Messages
        );
        assert_eq!(
            ChangeEvent::PollInserted { id: "p".to_string() }.topic(),
            Topic::Polls
        );
        assert_eq!(Topic::PollVotes.as_str(), "poll_votes");
    }

    #[tokio::test]
    async fn test_local_bus_delivers_in_order() {
        let bus = LocalChangeBus::new(16);
        let mut sub = bus.subscribe().await.unwrap();

        bus.publish(ChangeEvent::MessageInserted { id: "m1".to_string() })
            .await
            .unwrap();
        bus.publish(ChangeEvent::MessageDeleted { id: "m1".to_string() })
            .await
            .unwrap();

        assert_eq!(
            sub.recv().await,
            Delivery::Event(ChangeEvent::MessageInserted { id: "m1".to_string() })
        );
        assert_eq!(
            sub.recv().await,
            Delivery::Event(ChangeEvent::MessageDeleted { id: "m1".to_string() })
        );
    }

    #[tokio::test]
    async fn test_local_bus_reports_lag() {
        let bus = LocalChangeBus::new(1);
        let mut sub = bus.subscribe().await.unwrap();

        for i in 0..3 {
            bus.publish(ChangeEvent::PollInserted { id: format!("p{i}") })
                .await
                .unwrap();
        }

        assert_eq!(sub.recv().await, Delivery::Lagged(2));
        assert_eq!(
            sub.recv().await,
            Delivery::Event(ChangeEvent::PollInserted { id: "p2".to_string() })
        );
    }

    #[tokio::test]
    async fn test_signalled_lag_reaches_every_subscriber_in_order() {
        let bus = LocalChangeBus::new(16);
        let mut first = bus.subscribe().await.unwrap();
        let mut second = bus.subscribe().await.unwrap();

        bus.publish(ChangeEvent::MessageInserted { id: "m1".to_string() })
            .await
            .unwrap();
        bus.signal_lag(5);
        bus.publish(ChangeEvent::MessageInserted { id: "m2".to_string() })
            .await
            .unwrap();

        for sub in [&mut first, &mut second] {
            assert_eq!(
                sub.recv().await,
                Delivery::Event(ChangeEvent::MessageInserted { id: "m1".to_string() })
            );
            assert_eq!(sub.recv().await, Delivery::Lagged(5));
            assert_eq!(
                sub.recv().await,
                Delivery::Event(ChangeEvent::MessageInserted { id: "m2".to_string() })
            );
        }
    }

    #[tokio::test]
    async fn test_subscription_released_exactly_once() {
        let bus = LocalChangeBus::new(4);
        let first = bus.subscribe().await.unwrap();
        let second = bus.subscribe().await.unwrap();
        assert_eq!(bus.active_subscriptions(), 2);

        first.unsubscribe();
        assert_eq!(bus.active_subscriptions(), 1);

        drop(second);
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = LocalChangeBus::default();
        assert!(
            bus.publish(ChangeEvent::MessageInserted { id: "m".to_string() })
                .await
                .is_ok()
        );
    }
}
