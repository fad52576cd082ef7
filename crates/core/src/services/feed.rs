//! Feed reconciler.
//!
//! Keeps the message and poll collections of one chat view consistent while
//! the initial bulk load and live change events race each other, and derives
//! the single time-ordered feed shown to the user.
//!
//! Inserts are never trusted from the event payload: each one is hydrated
//! through a point lookup on the [`FeedSource`]. Because several lookups may
//! be in flight at once, an insert is split into [`FeedReconciler::begin_insert`]
//! and [`FeedReconciler::resolve`]. A delete, or a reload, invalidates the
//! outstanding ticket for the same item so a late lookup never resurrects it.

use std::collections::{HashMap, HashSet};

use huddle_common::AppResult;
use tracing::{debug, warn};

use super::change_feed::ChangeEvent;
use super::chat_item::{ChatItem, ChatMessage, ChatPoll, ItemKind};
use super::feed_source::FeedSource;

/// An outstanding point lookup.
#[derive(Debug, PartialEq, Eq)]
pub struct LookupTicket {
    kind: ItemKind,
    id: String,
    generation: u64,
}

impl LookupTicket {
    #[must_use]
    pub const fn kind(&self) -> ItemKind {
        self.kind
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// What the reconciler did with an observed event.
#[derive(Debug, PartialEq, Eq)]
pub enum Observed {
    /// Held until the initial load lands.
    Buffered,
    /// A point lookup must be run and its result passed to `resolve`.
    Lookup(LookupTicket),
    /// A delete was applied; `true` if an item was removed.
    Removed(bool),
    /// Not a feed event.
    Ignored,
}

#[derive(Debug, Clone)]
struct Entry {
    arrival: u64,
    item: ChatItem,
}

/// Owner of the two feed collections.
#[derive(Debug, Default)]
pub struct FeedReconciler {
    messages: Vec<Entry>,
    polls: Vec<Entry>,
    loaded: bool,
    pending: Vec<ChangeEvent>,
    in_flight: HashMap<(ItemKind, String), u64>,
    next_arrival: u64,
    next_generation: u64,
}

impl FeedReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events waiting for the initial load.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Replace both collections wholesale.
    ///
    /// Returns the events buffered before the load, in arrival order; the
    /// caller replays them through [`FeedReconciler::observe`]. Calling this
    /// again later is a full reload: outstanding lookups are invalidated.
    /// Duplicate ids keep their first occurrence.
    pub fn load_initial(
        &mut self,
        messages: Vec<ChatMessage>,
        polls: Vec<ChatPoll>,
    ) -> Vec<ChangeEvent> {
        self.messages.clear();
        self.polls.clear();
        self.in_flight.clear();

        let mut seen = HashSet::new();
        for message in messages {
            if seen.insert(message.id.clone()) {
                let entry = self.stamp(message.into());
                self.messages.push(entry);
            }
        }

        seen.clear();
        for poll in polls {
            if seen.insert(poll.id.clone()) {
                let entry = self.stamp(poll.into());
                self.polls.push(entry);
            }
        }

        self.loaded = true;
        debug!(
            messages = self.messages.len(),
            polls = self.polls.len(),
            replay = self.pending.len(),
            "Feed loaded"
        );
        std::mem::take(&mut self.pending)
    }

    /// Feed one change event into the reconciler.
    pub fn observe(&mut self, event: ChangeEvent) -> Observed {
        if matches!(event, ChangeEvent::VoteChanged { .. }) {
            return Observed::Ignored;
        }
        if !self.loaded {
            self.pending.push(event);
            return Observed::Buffered;
        }

        match event {
            ChangeEvent::MessageInserted { id } => {
                Observed::Lookup(self.begin_insert(ItemKind::Message, id))
            }
            ChangeEvent::PollInserted { id } => {
                Observed::Lookup(self.begin_insert(ItemKind::Poll, id))
            }
            ChangeEvent::MessageDeleted { id } => Observed::Removed(self.remove_message(&id)),
            ChangeEvent::VoteChanged { .. } => Observed::Ignored,
        }
    }

    /// Start a point lookup for an inserted item.
    ///
    /// A newer ticket for the same item supersedes an older one.
    pub fn begin_insert(&mut self, kind: ItemKind, id: impl Into<String>) -> LookupTicket {
        let id = id.into();
        self.next_generation += 1;
        let generation = self.next_generation;
        self.in_flight.insert((kind, id.clone()), generation);
        LookupTicket {
            kind,
            id,
            generation,
        }
    }

    /// Apply the result of a point lookup.
    ///
    /// Returns `true` if the item was appended. Stale tickets, failed or
    /// empty lookups, mismatched records and duplicates are dropped.
    pub fn resolve(&mut self, ticket: LookupTicket, result: AppResult<Option<ChatItem>>) -> bool {
        let key = (ticket.kind, ticket.id);
        if self.in_flight.get(&key) != Some(&ticket.generation) {
            debug!(kind = %key.0, id = %key.1, "Discarding superseded lookup");
            return false;
        }
        self.in_flight.remove(&key);
        let (kind, id) = key;

        let item = match result {
            Ok(Some(item)) => item,
            Ok(None) => {
                debug!(kind = %kind, id = %id, "Inserted item no longer readable");
                return false;
            }
            Err(e) => {
                warn!(kind = %kind, id = %id, error = %e, "Point lookup failed");
                return false;
            }
        };

        if item.kind() != kind || item.id() != id {
            warn!(kind = %kind, id = %id, got = %item.id(), "Lookup returned a different record");
            return false;
        }
        if self.contains(kind, &id) {
            return false;
        }

        let entry = self.stamp(item);
        self.collection_mut(kind).push(entry);
        true
    }

    /// Hydrate and append an inserted item.
    ///
    /// Before the initial load the event is buffered instead.
    pub async fn apply_insert(&mut self, source: &dyn FeedSource, kind: ItemKind, id: &str) -> bool {
        if !self.loaded {
            self.pending.push(match kind {
                ItemKind::Message => ChangeEvent::MessageInserted { id: id.to_string() },
                ItemKind::Poll => ChangeEvent::PollInserted { id: id.to_string() },
            });
            return false;
        }

        let ticket = self.begin_insert(kind, id);
        let result = source.fetch_item(kind, id).await;
        self.resolve(ticket, result)
    }

    /// Remove a message.
    ///
    /// Returns `true` if it was present. Deleting an unknown id is a no-op.
    /// Before the initial load the event is buffered instead.
    pub fn apply_delete(&mut self, id: &str) -> bool {
        if !self.loaded {
            self.pending.push(ChangeEvent::MessageDeleted { id: id.to_string() });
            return false;
        }
        self.remove_message(id)
    }

    /// Whether an item is currently in its collection.
    #[must_use]
    pub fn contains(&self, kind: ItemKind, id: &str) -> bool {
        self.collection(kind).iter().any(|e| e.item.id() == id)
    }

    /// Number of messages held.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Number of polls held.
    #[must_use]
    pub fn poll_count(&self) -> usize {
        self.polls.len()
    }

    /// Derive the merged, time-ordered feed.
    ///
    /// Ordered by `created_at` ascending, ties by arrival. Recomputed on every
    /// call.
    #[must_use]
    pub fn merged_feed(&self) -> MergedFeed<'_> {
        let mut entries: Vec<&Entry> = self.messages.iter().chain(&self.polls).collect();
        entries.sort_by_key(|e| (e.item.created_at(), e.arrival));
        MergedFeed { entries }
    }

    fn remove_message(&mut self, id: &str) -> bool {
        self.in_flight.remove(&(ItemKind::Message, id.to_string()));
        let before = self.messages.len();
        self.messages.retain(|e| e.item.id() != id);
        self.messages.len() != before
    }

    fn stamp(&mut self, item: ChatItem) -> Entry {
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        Entry { arrival, item }
    }

    fn collection(&self, kind: ItemKind) -> &[Entry] {
        match kind {
            ItemKind::Message => &self.messages,
            ItemKind::Poll => &self.polls,
        }
    }

    fn collection_mut(&mut self, kind: ItemKind) -> &mut Vec<Entry> {
        match kind {
            ItemKind::Message => &mut self.messages,
            ItemKind::Poll => &mut self.polls,
        }
    }
}

/// Ordered view over the reconciler's collections.
///
/// Can be iterated any number of times.
#[derive(Debug, Clone)]
pub struct MergedFeed<'a> {
    entries: Vec<&'a Entry>,
}

impl<'a> MergedFeed<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a ChatItem> + '_ {
        self.entries.iter().copied().map(|e| &e.item)
    }

    pub fn ids(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.iter().map(ChatItem::id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Owned copy of the feed.
    #[must_use]
    pub fn to_vec(&self) -> Vec<ChatItem> {
        self.iter().cloned().collect()
    }
}
