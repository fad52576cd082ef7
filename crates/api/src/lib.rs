//! HTTP API layer for huddle.
//!
//! This crate provides the REST API and real-time streaming:
//!
//! - **Endpoints**: chat feed, messages, polls and votes
//! - **Extractors**: bearer-token identification
//! - **Middleware**: application state and authentication
//! - **Streaming**: Server-Sent Events for the live feed and poll results
//!
//! Built on Axum 0.8.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod sse;

pub use endpoints::router;
pub use sse::SseEvent;
