//! Live feed sessions.
//!
//! A session is one mounted chat view: a tokio task that owns a
//! [`FeedReconciler`], drives it from the change bus and publishes a merged
//! snapshot after every mutation. Consumers hold a [`FeedHandle`]; dropping
//! it tears the session down.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{self, FuturesUnordered, Stream, StreamExt};
use huddle_common::AppResult;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::change_feed::{ChangeEvent, ChangeSubscriberService, ChangeSubscription, Delivery};
use super::chat_item::ChatItem;
use super::feed::{FeedReconciler, LookupTicket, Observed};
use super::feed_source::{FeedSnapshot, FeedSourceService};

/// Shared, immutable copy of the merged feed.
pub type FeedItems = Arc<Vec<ChatItem>>;

type LookupFuture =
    Pin<Box<dyn Future<Output = (LookupTicket, AppResult<Option<ChatItem>>)> + Send>>;

struct FeedSession {
    reconciler: FeedReconciler,
    source: FeedSourceService,
    subscription: ChangeSubscription,
    lookups: FuturesUnordered<LookupFuture>,
    snapshots: watch::Sender<Option<FeedItems>>,
    bus_open: bool,
}

impl FeedSession {
    fn spawn(source: FeedSourceService, subscription: ChangeSubscription) -> FeedHandle {
        let (snapshots, rx) = watch::channel(None);
        let (stop_tx, stop_rx) = oneshot::channel();

        let session = Self {
            reconciler: FeedReconciler::new(),
            source,
            subscription,
            lookups: FuturesUnordered::new(),
            snapshots,
            bus_open: true,
        };
        let task = tokio::spawn(session.run(stop_rx));

        FeedHandle {
            snapshots: rx,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    async fn run(mut self, mut stop: oneshot::Receiver<()>) {
        debug!("Feed session started");
        if self.load(&mut stop).await {
            self.drive(&mut stop).await;
        }

        let Self {
            subscription,
            lookups,
            ..
        } = self;
        if !lookups.is_empty() {
            debug!(pending = lookups.len(), "Discarding in-flight lookups");
        }
        drop(lookups);
        subscription.unsubscribe();
        debug!("Feed session closed");
    }

    /// Initial load. Events arriving meanwhile are buffered by the reconciler.
    ///
    /// Returns `false` if the session was stopped first.
    async fn load(&mut self, stop: &mut oneshot::Receiver<()>) -> bool {
        let source = Arc::clone(&self.source);
        let fetch = source.fetch_all();
        tokio::pin!(fetch);
        let mut needs_reload = false;

        let result = loop {
            tokio::select! {
                _ = &mut *stop => return false,
                result = &mut fetch => break result,
                delivery = self.subscription.recv(), if self.bus_open => match delivery {
                    Delivery::Event(event) => {
                        self.reconciler.observe(event);
                    }
                    Delivery::Lagged(missed) => {
                        warn!(missed, "Change feed lagged during initial load");
                        needs_reload = true;
                    }
                    Delivery::Closed => {
                        warn!("Change feed closed during initial load");
                        self.bus_open = false;
                    }
                },
            }
        };

        let FeedSnapshot { messages, polls } = result.unwrap_or_else(|e| {
            warn!(error = %e, "Initial feed load failed, starting empty");
            FeedSnapshot::default()
        });

        for event in self.reconciler.load_initial(messages, polls) {
            self.dispatch(event);
        }
        if needs_reload {
            self.reload().await;
        }
        self.publish();
        true
    }

    async fn drive(&mut self, stop: &mut oneshot::Receiver<()>) {
        loop {
            if !self.bus_open && self.lookups.is_empty() {
                info!("Change feed closed, feed session idle");
                break;
            }

            tokio::select! {
                _ = &mut *stop => break,
                Some((ticket, result)) = self.lookups.next(), if !self.lookups.is_empty() => {
                    if self.reconciler.resolve(ticket, result) {
                        self.publish();
                    }
                }
                delivery = self.subscription.recv(), if self.bus_open => match delivery {
                    Delivery::Event(event) => self.dispatch(event),
                    Delivery::Lagged(missed) => {
                        warn!(missed, "Change feed lagged, reloading feed");
                        self.reload().await;
                        self.publish();
                    }
                    Delivery::Closed => self.bus_open = false,
                },
            }
        }
    }

    fn dispatch(&mut self, event: ChangeEvent) {
        match self.reconciler.observe(event) {
            Observed::Lookup(ticket) => {
                let source = Arc::clone(&self.source);
                self.lookups.push(Box::pin(async move {
                    let result = source.fetch_item(ticket.kind(), ticket.id()).await;
                    (ticket, result)
                }));
            }
            Observed::Removed(true) => self.publish(),
            Observed::Removed(false) | Observed::Buffered | Observed::Ignored => {}
        }
    }

    async fn reload(&mut self) {
        match self.source.fetch_all().await {
            Ok(FeedSnapshot { messages, polls }) => {
                self.reconciler.load_initial(messages, polls);
            }
            Err(e) => warn!(error = %e, "Feed reload failed, keeping current items"),
        }
    }

    fn publish(&self) {
        let items = self.reconciler.merged_feed().to_vec();
        self.snapshots.send_replace(Some(Arc::new(items)));
    }
}

/// Consumer side of a feed session.
pub struct FeedHandle {
    snapshots: watch::Receiver<Option<FeedItems>>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Latest published feed, `None` until the initial load lands.
    #[must_use]
    pub fn snapshot(&self) -> Option<FeedItems> {
        self.snapshots.borrow().clone()
    }

    /// Wait for the next published feed.
    ///
    /// Returns `None` once the session has ended.
    pub async fn changed(&mut self) -> Option<FeedItems> {
        self.snapshots.changed().await.ok()?;
        self.snapshots.borrow_and_update().clone()
    }

    /// Stream of published feeds that owns the session.
    pub fn into_stream(self) -> impl Stream<Item = FeedItems> + Send {
        stream::unfold(self, |mut handle| async move {
            let items = handle.changed().await?;
            Some((items, handle))
        })
    }

    /// Stop the session and wait for it to release its subscription.
    pub async fn close(mut self) {
        self.signal_stop();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Feed session task failed");
        }
    }

    fn signal_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

/// Opens feed sessions and one-shot feed reads.
#[derive(Clone)]
pub struct FeedService {
    source: FeedSourceService,
    subscriber: ChangeSubscriberService,
}

impl FeedService {
    /// Create a new feed service.
    #[must_use]
    pub const fn new(source: FeedSourceService, subscriber: ChangeSubscriberService) -> Self {
        Self { source, subscriber }
    }

    /// Start a live session.
    ///
    /// The subscription is taken before the initial load starts so no change
    /// committed during the load is missed.
    pub async fn open(&self) -> AppResult<FeedHandle> {
        let subscription = self.subscriber.subscribe().await?;
        Ok(FeedSession::spawn(Arc::clone(&self.source), subscription))
    }

    /// Load the merged feed once, without a subscription.
    pub async fn snapshot(&self) -> AppResult<Vec<ChatItem>> {
        let FeedSnapshot { messages, polls } = self.source.fetch_all().await?;
        let mut reconciler = FeedReconciler::new();
        reconciler.load_initial(messages, polls);
        Ok(reconciler.merged_feed().to_vec())
    }
}
