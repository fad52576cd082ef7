//! Redis Pub/Sub for cross-instance change distribution.
//!
//! Every instance publishes the chat changes it commits to one channel per
//! topic and relays what it receives into a local bus, so feed sessions see
//! changes made through any instance.

#![allow(missing_docs)]

use async_trait::async_trait;
use fred::clients::{Client, SubscriberClient};
use fred::error::{Error as RedisError, ErrorKind as RedisErrorKind};
use fred::interfaces::{ClientLike, EventInterface, PubsubInterface};
use fred::types::config::Config as RedisConfig;
use huddle_common::{AppError, AppResult};
use huddle_core::services::{
    ChangeEvent, ChangeSubscriber, ChangeSubscription, EventPublisher, LocalChangeBus, Topic,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Redis channel carrying one topic, e.g. `huddle:chat:messages`.
#[must_use]
pub fn channel_name(prefix: &str, topic: Topic) -> String {
    format!("{prefix}:chat:{}", topic.as_str())
}

/// Decode a Pub/Sub payload.
fn parse_payload(payload: &str) -> Option<ChangeEvent> {
    match serde_json::from_str::<ChangeEvent>(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Failed to parse Pub/Sub message");
            None
        }
    }
}

/// Forward Pub/Sub messages into `local` until the message stream closes.
///
/// Messages dropped by a slow relay are reported to local subscribers as a
/// lag so their sessions reload.
async fn relay<T, F>(mut messages: broadcast::Receiver<T>, local: LocalChangeBus, payload: F)
where
    T: Clone,
    F: Fn(&T) -> Option<String>,
{
    loop {
        match messages.recv().await {
            Ok(message) => {
                let Some(payload) = payload(&message) else {
                    continue;
                };
                if let Some(event) = parse_payload(&payload) {
                    debug!(?event, "Received change event");
                    if let Err(e) = local.publish(event).await {
                        warn!(error = %e, "Failed to relay change event");
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Pub/Sub relay lagged, signalling subscribers");
                local.signal_lag(missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    info!("Pub/Sub message stream ended");
}

/// Redis Pub/Sub manager for change events.
#[derive(Clone)]
pub struct RedisPubSub {
    publisher: Client,
    subscriber: SubscriberClient,
    prefix: String,
    /// Local bus that relays events received from Redis.
    local: LocalChangeBus,
}

impl RedisPubSub {
    /// Connect the publisher and subscriber clients.
    pub async fn new(redis_url: &str, prefix: &str, capacity: usize) -> Result<Self, RedisError> {
        let config = RedisConfig::from_url(redis_url)?;

        let publisher = Client::new(config.clone(), None, None, None);
        publisher.init().await?;

        let subscriber = SubscriberClient::new(config, None, None, None);
        subscriber.init().await?;

        info!(prefix, "Redis Pub/Sub initialized");

        Ok(Self {
            publisher,
            subscriber,
            prefix: prefix.to_string(),
            local: LocalChangeBus::new(capacity),
        })
    }

    /// Subscribe to every chat topic and start relaying events.
    pub async fn start(&self) -> Result<(), RedisError> {
        for topic in Topic::ALL {
            self.subscriber
                .subscribe(channel_name(&self.prefix, topic))
                .await?;
        }

        info!("Subscribed to chat change channels");

        tokio::spawn(relay(
            self.subscriber.message_rx(),
            self.local.clone(),
            |message| message.value.as_string(),
        ));

        Ok(())
    }

    /// Publish an event on its topic channel.
    pub async fn publish_event(&self, event: &ChangeEvent) -> Result<(), RedisError> {
        let payload = serde_json::to_string(event).map_err(|e| {
            RedisError::new(
                RedisErrorKind::InvalidArgument,
                format!("Serialization error: {e}"),
            )
        })?;
        let channel = channel_name(&self.prefix, event.topic());
        let _: () = self.publisher.publish(&channel, payload).await?;
        debug!(channel, ?event, "Published change event");
        Ok(())
    }

    /// Number of feed sessions currently subscribed on this instance.
    #[must_use]
    pub fn local_subscriber_count(&self) -> usize {
        self.local.active_subscriptions()
    }

    /// Shutdown the Pub/Sub manager.
    pub async fn shutdown(&self) -> Result<(), RedisError> {
        self.subscriber.quit().await?;
        self.publisher.quit().await?;
        info!("Redis Pub/Sub shutdown");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for RedisPubSub {
    async fn publish(&self, event: ChangeEvent) -> AppResult<()> {
        self.publish_event(&event)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))
    }
}

#[async_trait]
impl ChangeSubscriber for RedisPubSub {
    async fn subscribe(&self) -> AppResult<ChangeSubscription> {
        self.local.subscribe().await
    }
}
