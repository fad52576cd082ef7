//! In-memory fixtures shared by the service tests.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use huddle_common::{AppError, AppResult};
use tokio::sync::Notify;

use super::change_feed::{ChangeEvent, EventPublisher};
use super::chat_item::{ChatMessage, ChatPoll, Profile};
use super::feed_source::{FeedSnapshot, FeedSource};

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, hour, minute, 0).unwrap()
}

pub fn message(id: &str, hour: u32, minute: u32) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        author_id: "u1".to_string(),
        author: Some(Profile {
            id: "u1".to_string(),
            full_name: "Robin Hale".to_string(),
            avatar_url: None,
        }),
        content: Some(format!("text of {id}")),
        media: None,
        created_at: at(hour, minute),
    }
}

pub fn poll(id: &str, hour: u32, minute: u32) -> ChatPoll {
    ChatPoll {
        id: id.to_string(),
        author_id: "u2".to_string(),
        author: None,
        question: format!("question {id}"),
        options: vec!["Yes".to_string(), "No".to_string()],
        created_at: at(hour, minute),
    }
}

/// Feed source whose reads can be held open until a test releases them.
#[derive(Default)]
pub struct InMemorySource {
    messages: Mutex<Vec<ChatMessage>>,
    polls: Mutex<Vec<ChatPoll>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    load_gate: Mutex<Option<Arc<Notify>>>,
    fail_loads: AtomicBool,
    fail_lookups: AtomicBool,
    loads: AtomicUsize,
    lookups: AtomicUsize,
}

impl InMemorySource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_message(&self, message: ChatMessage) {
        self.messages.lock().unwrap().push(message);
    }

    pub fn put_poll(&self, poll: ChatPoll) {
        self.polls.lock().unwrap().push(poll);
    }

    /// Hold lookups of `id` until the returned gate is notified.
    pub fn gate(&self, id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(id.to_string(), Arc::clone(&gate));
        gate
    }

    /// Hold the next bulk loads until the returned gate is notified.
    pub fn gate_load(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.load_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    async fn wait_for(&self, id: &str) {
        let gate = self.gates.lock().unwrap().remove(id);
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl FeedSource for InMemorySource {
    async fn fetch_all(&self) -> AppResult<FeedSnapshot> {
        let gate = self.load_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(AppError::Database("connection refused".to_string()));
        }
        Ok(FeedSnapshot {
            messages: self.messages.lock().unwrap().clone(),
            polls: self.polls.lock().unwrap().clone(),
        })
    }

    async fn fetch_message(&self, id: &str) -> AppResult<Option<ChatMessage>> {
        self.wait_for(id).await;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(AppError::Database("read timed out".to_string()));
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn fetch_poll(&self, id: &str) -> AppResult<Option<ChatPoll>> {
        self.wait_for(id).await;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(AppError::Database("read timed out".to_string()));
        }
        Ok(self
            .polls
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }
}

/// Publisher that records every event it is given.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: ChangeEvent) -> AppResult<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
