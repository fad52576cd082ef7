//! Redis integration tests.
//!
//! These tests require a running Redis instance.
//! Run with: `cargo test --test redis_integration -- --ignored`
//!
//! Set `REDIS_URL` environment variable to point to your Redis instance.
//! Default: <redis://localhost:6379>

use std::time::Duration;

use huddle_core::services::{ChangeEvent, ChangeSubscriber, Delivery, EventPublisher};
use huddle_realtime::RedisPubSub;

fn get_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn test_prefix(name: &str) -> String {
    format!("huddle-test-{name}-{}", std::process::id())
}

/// Test that we can connect to Redis.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_redis_connection() {
    let url = get_redis_url();
    let pubsub = RedisPubSub::new(&url, &test_prefix("connect"), 16).await;
    assert!(pubsub.is_ok(), "Failed to connect to Redis: {:?}", pubsub.err());
}

/// Test that a published event comes back through a subscription.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_publish_round_trips_to_subscription() {
    let url = get_redis_url();
    let pubsub = RedisPubSub::new(&url, &test_prefix("roundtrip"), 16)
        .await
        .expect("Failed to connect to Redis");
    pubsub.start().await.expect("Failed to subscribe");

    let mut subscription = pubsub.subscribe().await.expect("Failed to subscribe locally");
    let event = ChangeEvent::PollInserted {
        id: "poll-123".to_string(),
    };
    pubsub
        .publish(event.clone())
        .await
        .expect("Failed to publish");

    let delivery = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("Timed out waiting for event");
    assert_eq!(delivery, Delivery::Event(event));

    subscription.unsubscribe();
    assert_eq!(pubsub.local_subscriber_count(), 0);
    pubsub.shutdown().await.expect("Failed to shutdown");
}

/// Test that instances with different prefixes do not see each other.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_prefixes_are_isolated() {
    let url = get_redis_url();
    let listener = RedisPubSub::new(&url, &test_prefix("listener"), 16)
        .await
        .expect("Failed to connect to Redis");
    listener.start().await.expect("Failed to subscribe");
    let other = RedisPubSub::new(&url, &test_prefix("other"), 16)
        .await
        .expect("Failed to connect to Redis");

    let mut subscription = listener.subscribe().await.expect("Failed to subscribe locally");
    other
        .publish(ChangeEvent::MessageInserted {
            id: "m1".to_string(),
        })
        .await
        .expect("Failed to publish");

    let delivery = tokio::time::timeout(Duration::from_millis(300), subscription.recv()).await;
    assert!(delivery.is_err(), "Unexpected delivery: {delivery:?}");

    listener.shutdown().await.expect("Failed to shutdown");
    other.shutdown().await.expect("Failed to shutdown");
}
