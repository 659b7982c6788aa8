//! Best-effort fan-out of snapshots to live subscribers.
//!
//! The [`BroadcastHub`] keeps the live subscriber set and the most recently
//! published snapshot behind a single lock, independent from the store's.
//! Holding both under one lock is what makes [`BroadcastHub::register`]
//! gap-free: a new subscriber receives exactly the latest published
//! snapshot and then every later publication, never a duplicate and never
//! a hole.
//!
//! Delivery is a non-blocking hand-off into each subscriber's own bounded
//! queue; the connection task owning the receiving end does the network
//! I/O. A subscriber whose queue is closed or full is unregistered on the
//! spot, so one slow client can never stall publication to the others.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{Snapshot, SnapshotReceiver};

/// Why a snapshot could not be handed to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The subscriber has gone away.
    #[error("subscriber closed")]
    Closed,

    /// The subscriber's queue is full; it is not keeping up.
    #[error("subscriber lagging")]
    Lagging,
}

/// Something that can accept pushed snapshots.
///
/// `deliver` must not block: it is called with the hub's lock held.
pub trait Subscriber: Send + Sync {
    /// Hand over one snapshot.
    ///
    /// # Errors
    ///
    /// Any error unregisters the subscriber.
    fn deliver(&self, snapshot: &Snapshot) -> Result<(), DeliveryError>;
}

impl Subscriber for mpsc::Sender<Snapshot> {
    fn deliver(&self, snapshot: &Snapshot) -> Result<(), DeliveryError> {
        self.try_send(snapshot.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Lagging,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Identifier of a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered in-process queue of snapshots.
#[derive(Debug)]
pub struct Subscription {
    /// Id to pass to [`BroadcastHub::unregister`].
    pub id: SubscriberId,
    /// Snapshots in publication order, starting with the one current at
    /// registration time.
    pub receiver: mpsc::Receiver<Snapshot>,
}

/// The live subscriber set and the fan-out loop.
pub struct BroadcastHub {
    inner: Mutex<HubInner>,
}

struct HubInner {
    latest: Snapshot,
    subscribers: BTreeMap<SubscriberId, Arc<dyn Subscriber>>,
}

impl BroadcastHub {
    /// Create a hub whose "latest" snapshot is `initial`.
    pub fn new(initial: Snapshot) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                latest: initial,
                subscribers: BTreeMap::new(),
            }),
        }
    }

    /// Add a subscriber, delivering the latest snapshot to it first.
    ///
    /// # Errors
    ///
    /// If the initial delivery fails the subscriber is not registered and
    /// the delivery error is returned.
    pub async fn register(&self, subscriber: Arc<dyn Subscriber>) -> Result<SubscriberId, DeliveryError> {
        let mut inner = self.inner.lock().await;
        subscriber.deliver(&inner.latest)?;

        let id = SubscriberId::new();
        inner.subscribers.insert(id, subscriber);
        debug!(%id, subscribers = inner.subscribers.len(), "subscriber registered");
        Ok(id)
    }

    /// Register a bounded in-process queue holding up to `capacity`
    /// undelivered snapshots.
    ///
    /// # Errors
    ///
    /// Only fails if the initial delivery fails, which cannot happen for a
    /// fresh queue.
    pub async fn subscribe(&self, capacity: usize) -> Result<Subscription, DeliveryError> {
        let (tx, receiver) = mpsc::channel(capacity.max(1));
        let id = self.register(Arc::new(tx)).await?;
        Ok(Subscription { id, receiver })
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.subscribers.remove(&id).is_some();
        if removed {
            debug!(%id, subscribers = inner.subscribers.len(), "subscriber unregistered");
        }
        removed
    }

    /// Deliver `snapshot` to every registered subscriber, pruning those
    /// that fail. Returns how many subscribers accepted it.
    pub async fn publish(&self, snapshot: Snapshot) -> usize {
        let mut inner = self.inner.lock().await;
        let mut delivered: usize = 0;

        inner.subscribers.retain(|id, subscriber| match subscriber.deliver(&snapshot) {
            Ok(()) => {
                delivered = delivered.saturating_add(1);
                true
            }
            Err(e) => {
                warn!(%id, error = %e, version = snapshot.version(), "pruning subscriber");
                false
            }
        });

        inner.latest = snapshot;
        delivered
    }

    /// The most recently published snapshot.
    pub async fn read(&self) -> Snapshot {
        self.inner.lock().await.latest.clone()
    }

    /// Number of live subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.lock().await.subscribers.len()
    }

    /// Drain the store's distribution channel, publishing each snapshot
    /// in order. Returns when the channel ends, after disconnecting every
    /// subscriber.
    pub async fn run(self: Arc<Self>, mut snapshots: SnapshotReceiver) {
        while let Some(snapshot) = snapshots.recv().await {
            let version = snapshot.version();
            let delivered = self.publish(snapshot).await;
            debug!(version, delivered, "snapshot fanned out");
        }

        let mut inner = self.inner.lock().await;
        let dropped = inner.subscribers.len();
        inner.subscribers.clear();
        debug!(dropped, "distribution channel closed, hub stopping");
    }
}
