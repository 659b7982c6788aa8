//! The single source of truth for [`SystemState`].
//!
//! [`StateStore`] owns the live aggregate behind one whole-aggregate lock.
//! Nothing outside the store ever holds a reference to the live value:
//! [`StateStore::read`] and [`StateStore::mutate`] hand out [`Snapshot`]s,
//! immutable copies shared through an [`Arc`].
//!
//! Every committed mutation enqueues exactly one snapshot on the
//! distribution channel returned by [`StateStore::new`]. The enqueue
//! happens while the write lock is still held, so the channel order is
//! the commit order. The channel is unbounded and the send never waits,
//! so no I/O or suspension happens under the lock.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Serialize, Serializer};
use thunderbird_types::SystemState;
use tokio::sync::{RwLock, mpsc};
use tracing::{trace, warn};

use crate::signal::StopListener;

/// Receiving half of the distribution channel, drained by the hub.
pub type SnapshotReceiver = mpsc::UnboundedReceiver<Snapshot>;

/// An immutable, versioned copy of [`SystemState`].
///
/// Versions start at 0 for the initial state and increase by one per
/// committed mutation. Serializes as the bare state document.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    version: u64,
    state: Arc<SystemState>,
}

impl Snapshot {
    fn new(version: u64, state: SystemState) -> Self {
        Self {
            version,
            state: Arc::new(state),
        }
    }

    /// Commit sequence number of this snapshot.
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// The captured state.
    pub fn state(&self) -> &SystemState {
        &self.state
    }

    /// Encode the state document as JSON text.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if encoding fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self.state.as_ref())
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.state.serialize(serializer)
    }
}

/// Reasons a mutation was not committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store is shutting down and accepts no more mutations.
    #[error("state store is closed")]
    Closed,

    /// The calling task was told to stop before it acquired the store.
    #[error("mutation abandoned: caller was stopped")]
    Stopped,
}

/// Shared, serialized access to the live [`SystemState`].
#[derive(Debug)]
pub struct StateStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    state: SystemState,
    version: u64,
    outbox: Option<mpsc::UnboundedSender<Snapshot>>,
}

impl StateStore {
    /// Create a store holding `initial` (version 0) and the receiving end
    /// of its distribution channel.
    pub fn new(initial: SystemState) -> (Self, SnapshotReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Self {
            inner: RwLock::new(StoreInner {
                state: initial,
                version: 0,
                outbox: Some(tx),
            }),
        };
        (store, rx)
    }

    /// Copy out the current state.
    pub async fn read(&self) -> Snapshot {
        let inner = self.inner.read().await;
        Snapshot::new(inner.version, inner.state.clone())
    }

    /// Apply `f` to the live state atomically and publish the result.
    ///
    /// After `f` runs, the store re-establishes the aggregate invariants,
    /// stamps `last_update`, bumps the version and enqueues one snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] once [`close`](Self::close) has run;
    /// `f` is not called in that case.
    pub async fn mutate<F>(&self, f: F) -> Result<Snapshot, StoreError>
    where
        F: FnOnce(&mut SystemState),
    {
        let mut inner = self.inner.write().await;
        inner.commit(f)
    }

    /// Like [`mutate`](Self::mutate), but re-checks `stop` after exclusive
    /// access is acquired. A task that has been told to stop never commits,
    /// even if it was already waiting for the lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Stopped`] if `stop` is triggered, or
    /// [`StoreError::Closed`] if the store is closed.
    pub async fn mutate_unless_stopped<F>(
        &self,
        stop: &StopListener,
        f: F,
    ) -> Result<Snapshot, StoreError>
    where
        F: FnOnce(&mut SystemState),
    {
        let mut inner = self.inner.write().await;
        if stop.is_stopped() {
            return Err(StoreError::Stopped);
        }
        inner.commit(f)
    }

    /// Stop accepting mutations and end the distribution channel.
    ///
    /// Snapshots already enqueued are still delivered. Idempotent.
    pub async fn close(&self) {
        self.inner.write().await.outbox = None;
    }

    /// Whether [`close`](Self::close) has run.
    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.outbox.is_none()
    }
}

impl StoreInner {
    fn commit<F>(&mut self, f: F) -> Result<Snapshot, StoreError>
    where
        F: FnOnce(&mut SystemState),
    {
        let Some(outbox) = &self.outbox else {
            return Err(StoreError::Closed);
        };

        let height_floor = self.state.ledger.block_height;
        let tx_floor = self.state.ledger.transaction_count;

        f(&mut self.state);
        enforce_invariants(&mut self.state, height_floor, tx_floor);

        self.state.last_update = Utc::now();
        self.version = self.version.saturating_add(1);
        let snapshot = Snapshot::new(self.version, self.state.clone());

        if outbox.send(snapshot.clone()).is_err() {
            warn!(version = self.version, "distribution channel closed, snapshot not published");
        } else {
            trace!(version = self.version, "snapshot committed");
        }
        Ok(snapshot)
    }
}

/// Restore the cross-field invariants after a transformation.
fn enforce_invariants(state: &mut SystemState, height_floor: u64, tx_floor: u64) {
    let mut seen = BTreeSet::new();
    state.satellites.retain(|sat| seen.insert(sat.id.clone()));

    state.active_channel_count = state.active_channel_count.min(state.satellites.len());
    state.ledger.block_height = state.ledger.block_height.max(height_floor);
    state.ledger.transaction_count = state.ledger.transaction_count.max(tx_floor);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use thunderbird_types::SystemMode;

    use super::*;
    use crate::signal::StopSignal;
    use crate::telemetry::synthetic_fleet;

    fn fresh_store() -> (StateStore, SnapshotReceiver) {
        StateStore::new(SystemState::seeded(SystemMode::Realtime, Utc::now()))
    }

    #[tokio::test]
    async fn read_returns_independent_copy() {
        let (store, _rx) = fresh_store();
        let before = store.read().await;

        store.mutate(|s| s.key_pool_size = 7).await.unwrap();

        assert_eq!(before.state().key_pool_size, 0);
        assert_eq!(before.version(), 0);
        let after = store.read().await;
        assert_eq!(after.state().key_pool_size, 7);
        assert_eq!(after.version(), 1);
    }

    #[tokio::test]
    async fn each_mutation_publishes_exactly_once() {
        let (store, mut rx) = fresh_store();

        let first = store.mutate(|s| s.key_pool_size = 1).await.unwrap();
        let second = store.mutate(|s| s.key_pool_size = 2).await.unwrap();

        assert_eq!(rx.try_recv().unwrap(), first);
        assert_eq!(rx.try_recv().unwrap(), second);
        assert!(rx.try_recv().is_err());
        assert!(second.state().last_update >= first.state().last_update);
    }

    #[tokio::test]
    async fn invariants_hold_after_arbitrary_mutations() {
        let (store, _rx) = fresh_store();
        let mut rng = SmallRng::seed_from_u64(7);
        store
            .mutate(|s| s.satellites = synthetic_fleet(5, &mut rng, Utc::now()))
            .await
            .unwrap();

        let mut last_height = 0;
        let mut last_tx = 0;
        for _ in 0..200 {
            let channels = rng.random_range(0..20);
            let height = rng.random_range(0..50);
            let tx = rng.random_range(0..500);
            let drop_one = rng.random_bool(0.05);
            let snap = store
                .mutate(|s| {
                    s.active_channel_count = channels;
                    s.ledger.block_height = height;
                    s.ledger.transaction_count = tx;
                    if drop_one {
                        s.satellites.pop();
                    }
                })
                .await
                .unwrap();

            let state = snap.state();
            assert!(state.active_channel_count <= state.satellites.len());
            assert!(state.ledger.block_height >= last_height);
            assert!(state.ledger.transaction_count >= last_tx);
            last_height = state.ledger.block_height;
            last_tx = state.ledger.transaction_count;
        }
    }

    #[tokio::test]
    async fn duplicate_satellite_ids_are_collapsed() {
        let (store, _rx) = fresh_store();
        let mut rng = SmallRng::seed_from_u64(1);
        let snap = store
            .mutate(|s| {
                let fleet = synthetic_fleet(2, &mut rng, Utc::now());
                s.satellites = fleet.iter().chain(fleet.iter()).cloned().collect();
                s.active_channel_count = 4;
            })
            .await
            .unwrap();

        assert_eq!(snap.state().satellites.len(), 2);
        assert_eq!(snap.state().active_channel_count, 2);
    }

    #[tokio::test]
    async fn closed_store_rejects_mutations() {
        let (store, mut rx) = fresh_store();
        store.close().await;
        store.close().await;

        assert!(store.is_closed().await);
        assert_eq!(store.mutate(|s| s.key_pool_size = 9).await, Err(StoreError::Closed));
        assert_eq!(store.read().await.state().key_pool_size, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stopped_caller_never_commits() {
        let (store, mut rx) = fresh_store();
        let signal = StopSignal::new();
        let listener = signal.listener();

        let ok = store.mutate_unless_stopped(&listener, |s| s.key_pool_size = 3).await;
        assert!(ok.is_ok());

        signal.trigger();
        let stopped = store.mutate_unless_stopped(&listener, |s| s.key_pool_size = 4).await;
        assert_eq!(stopped, Err(StoreError::Stopped));
        assert_eq!(store.read().await.state().key_pool_size, 3);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn concurrent_writers_are_serialized_in_commit_order() {
        let (store, mut rx) = fresh_store();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    store
                        .mutate(|s| s.key_pool_size += 1)
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.read().await.state().key_pool_size, 400);
        let mut expected = 1;
        while let Ok(snap) = rx.try_recv() {
            assert_eq!(snap.version(), expected);
            assert_eq!(u64::from(snap.state().key_pool_size), expected);
            expected += 1;
        }
        assert_eq!(expected, 401);
    }

    #[tokio::test]
    async fn snapshot_serializes_as_state_document() {
        let (store, _rx) = fresh_store();
        let snap = store.read().await;
        let json: serde_json::Value = serde_json::from_str(&snap.to_json().unwrap()).unwrap();
        assert_eq!(json["systemMode"], "realtime");
        assert_eq!(serde_json::to_value(&snap).unwrap(), json);
    }
}
