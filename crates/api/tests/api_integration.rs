//! API integration tests.
//!
//! These tests drive the router end to end against a mock database and an
//! in-process change bus.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    middleware::from_fn_with_state,
    response::Response,
};
use chrono::{TimeZone, Utc};
use huddle_api::middleware::{AppState, auth_middleware};
use huddle_api::router as api_router;
use huddle_core::{
    ChangeEvent, ChangeSubscriber, ChatService, Delivery, FeedService, LocalChangeBus,
    PollService, ProfileService, RepositoryFeedSource,
};
use huddle_db::entities::{message, poll, poll_vote, profile};
use huddle_db::repositories::{
    MessageRepository, PollRepository, PollVoteRepository, ProfileRepository,
};
use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
use serde_json::{Value, json};
use tower::ServiceExt;

const TOKEN: &str = "token-u1";

fn at(hour: u32, minute: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, hour, minute, 0).unwrap()
}

fn create_test_profile(id: &str) -> profile::Model {
    profile::Model {
        id: id.to_string(),
        full_name: format!("Member {id}"),
        avatar_url: None,
        token: Some(format!("token-{id}")),
        created_at: at(8, 0).into(),
    }
}

fn create_test_message(id: &str, user_id: &str, minute: u32) -> message::Model {
    message::Model {
        id: id.to_string(),
        user_id: user_id.to_string(),
        content: Some(format!("message {id}")),
        media_url: None,
        media_type: None,
        created_at: at(10, minute).into(),
    }
}

fn create_test_poll(id: &str, minute: u32) -> poll::Model {
    poll::Model {
        id: id.to_string(),
        created_by: "u1".to_string(),
        question: "Friday lunch?".to_string(),
        options: json!(["Noodles", "Salad"]),
        created_at: at(10, minute).into(),
    }
}

fn create_test_vote(user_id: &str, option_index: i32) -> poll_vote::Model {
    poll_vote::Model {
        id: format!("v-{user_id}"),
        poll_id: "p1".to_string(),
        user_id: user_id.to_string(),
        option_index,
        created_at: at(11, 0).into(),
        updated_at: at(11, 0).into(),
    }
}

/// Create app state over a mock database and a local bus.
fn create_test_state(db: MockDatabase, bus: &LocalChangeBus) -> AppState {
    let db = Arc::new(db.into_connection());

    let message_repo = MessageRepository::new(Arc::clone(&db));
    let poll_repo = PollRepository::new(Arc::clone(&db));
    let poll_vote_repo = PollVoteRepository::new(Arc::clone(&db));
    let profile_repo = ProfileRepository::new(db);

    let mut chat_service = ChatService::new(message_repo.clone(), poll_repo.clone());
    chat_service.set_event_publisher(Arc::new(bus.clone()));

    let mut poll_service = PollService::new(poll_repo.clone(), poll_vote_repo);
    poll_service.set_event_publisher(Arc::new(bus.clone()));

    let feed_service = FeedService::new(
        Arc::new(RepositoryFeedSource::new(message_repo, poll_repo)),
        Arc::new(bus.clone()),
    );

    AppState {
        chat_service,
        poll_service,
        feed_service,
        profile_service: ProfileService::new(profile_repo),
        subscriber: Arc::new(bus.clone()),
    }
}

fn create_app(state: AppState) -> Router {
    api_router()
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

/// Mock database whose first query resolves the bearer token to `u1`.
fn authed_db() -> MockDatabase {
    MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_profile("u1")]])
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn authed(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_for_subscriptions(bus: &LocalChangeBus, expected: usize) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while bus.active_subscriptions() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscription count never settled");
}

#[tokio::test]
async fn test_feed_merges_messages_and_polls_by_time() {
    let bus = LocalChangeBus::default();
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[
            (
                create_test_message("m1", "u1", 5),
                Some(create_test_profile("u1")),
            ),
            (create_test_message("m2", "u2", 20), None),
        ]])
        .append_query_results([[(create_test_poll("p1", 10), Some(create_test_profile("u1")))]]);
    let app = create_app(create_test_state(db, &bus));

    let response = app.oneshot(get("/chat/feed")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["m1", "p1", "m2"]);
    assert_eq!(body["data"][1]["kind"], "poll");
    assert_eq!(body["data"][0]["author"]["fullName"], "Member u1");
}

#[tokio::test]
async fn test_send_message_requires_auth() {
    let bus = LocalChangeBus::default();
    let app = create_app(create_test_state(
        MockDatabase::new(DatabaseBackend::Postgres),
        &bus,
    ));

    let request = Request::builder()
        .method("POST")
        .uri("/chat/messages")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"content":"hi"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_send_message_publishes_insert() {
    let bus = LocalChangeBus::default();
    let mut subscription = bus.subscribe().await.unwrap();
    let db = authed_db().append_query_results([[create_test_message("m1", "u1", 0)]]);
    let app = create_app(create_test_state(db, &bus));

    let response = app
        .oneshot(authed(
            "POST",
            "/chat/messages",
            &json!({ "content": "message m1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["id"], "m1");
    assert_eq!(body["data"]["author"]["id"], "u1");

    assert!(matches!(
        subscription.recv().await,
        Delivery::Event(ChangeEvent::MessageInserted { id }) if id == "m1"
    ));
}

#[tokio::test]
async fn test_send_blank_message_is_rejected() {
    let bus = LocalChangeBus::default();
    let app = create_app(create_test_state(authed_db(), &bus));

    let response = app
        .oneshot(authed("POST", "/chat/messages", &json!({ "content": "   " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_delete_other_members_message_is_forbidden() {
    let bus = LocalChangeBus::default();
    let db = authed_db().append_query_results([[create_test_message("m9", "u2", 0)]]);
    let app = create_app(create_test_state(db, &bus));

    let response = app
        .oneshot(authed("DELETE", "/chat/messages/m9", &json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete_own_message() {
    let bus = LocalChangeBus::default();
    let mut subscription = bus.subscribe().await.unwrap();
    let db = authed_db()
        .append_query_results([[create_test_message("m1", "u1", 0)]])
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }]);
    let app = create_app(create_test_state(db, &bus));

    let response = app
        .oneshot(authed("DELETE", "/chat/messages/m1", &json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(matches!(
        subscription.recv().await,
        Delivery::Event(ChangeEvent::MessageDeleted { id }) if id == "m1"
    ));
}

#[tokio::test]
async fn test_create_poll_with_one_option_is_rejected() {
    let bus = LocalChangeBus::default();
    let app = create_app(create_test_state(authed_db(), &bus));

    let response = app
        .oneshot(authed(
            "POST",
            "/chat/polls",
            &json!({ "question": "Ship it?", "options": ["Yes", "  "] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_poll_results_for_anonymous_viewer() {
    let bus = LocalChangeBus::default();
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_poll("p1", 0)]])
        .append_query_results([[
            create_test_vote("u1", 0),
            create_test_vote("u2", 0),
            create_test_vote("u3", 1),
            create_test_vote("u4", 0),
        ]]);
    let app = create_app(create_test_state(db, &bus));

    let response = app.oneshot(get("/polls/p1")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["totalVotes"], 4);
    assert_eq!(body["data"]["options"][0]["percentage"], 75);
    assert_eq!(body["data"]["options"][1]["percentage"], 25);
    assert!(body["data"]["myVote"].is_null());
}

#[tokio::test]
async fn test_vote_with_invalid_option_is_rejected() {
    let bus = LocalChangeBus::default();
    let db = authed_db().append_query_results([[create_test_poll("p1", 0)]]);
    let app = create_app(create_test_state(db, &bus));

    let response = app
        .oneshot(authed("POST", "/polls/p1/vote", &json!({ "optionIndex": 2 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_vote_with_negative_option_fails_validation() {
    let bus = LocalChangeBus::default();
    let app = create_app(create_test_state(authed_db(), &bus));

    let response = app
        .oneshot(authed("POST", "/polls/p1/vote", &json!({ "optionIndex": -1 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_stream_releases_subscription_on_disconnect() {
    let bus = LocalChangeBus::default();
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<(message::Model, Option<profile::Model>)>::new()])
        .append_query_results([Vec::<(poll::Model, Option<profile::Model>)>::new()]);
    let app = create_app(create_test_state(db, &bus));

    let response = app.oneshot(get("/streaming/sse/chat")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(bus.active_subscriptions(), 1);

    drop(response);
    wait_for_subscriptions(&bus, 0).await;
}

#[tokio::test]
async fn test_poll_stream_for_missing_poll() {
    let bus = LocalChangeBus::default();
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<poll::Model>::new()]);
    let app = create_app(create_test_state(db, &bus));

    let response = app.oneshot(get("/streaming/sse/polls/gone")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(bus.active_subscriptions(), 0);
}
