//! Shared application state for the gateway.

use std::sync::Arc;

use thunderbird_core::hub::BroadcastHub;
use thunderbird_core::supervisor::Supervisor;

/// Shared state for the Axum application, injected via `State`.
#[derive(Clone)]
pub struct AppState {
    /// Mode control and state reads.
    pub supervisor: Arc<Supervisor>,
    /// Subscriber registry for `WebSocket` connections.
    pub hub: Arc<BroadcastHub>,
    /// Undelivered snapshots a connection may queue before it is dropped.
    pub subscriber_queue_capacity: usize,
}

impl AppState {
    /// Bundle the supervisor and hub for the router.
    pub const fn new(
        supervisor: Arc<Supervisor>,
        hub: Arc<BroadcastHub>,
        subscriber_queue_capacity: usize,
    ) -> Self {
        Self {
            supervisor,
            hub,
            subscriber_queue_capacity,
        }
    }
}
