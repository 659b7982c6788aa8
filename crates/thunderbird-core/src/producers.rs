//! Free-running, timer-driven producers.
//!
//! Each producer is a [`Producer`]: a pure, synchronous transformation of
//! [`SystemState`] applied once per tick under the store's lock. The
//! async plumbing (timer, stop signal, commit) lives in [`run_producer`],
//! shared by all of them. Telemetry is special only at startup: it first
//! decides between the live upstream and the synthetic fleet, see
//! [`run_telemetry`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use thunderbird_types::{Satellite, SystemMode, SystemState};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::signal::StopListener;
use crate::store::{StateStore, StoreError};
use crate::telemetry::{TelemetrySource, fresh_key_id, synthetic_fleet};

/// Largest per-axis position change per telemetry tick, in kilometres.
const POSITION_JITTER_KM: f64 = 5.0;

/// Chance (1 in N) that a satellite's key is reissued on a telemetry tick.
const KEY_REISSUE_ONE_IN: u32 = 10;

/// Base of the realtime key pool; a random `0..KEY_POOL_SPREAD` is added.
const KEY_POOL_BASE: u32 = 100;
const KEY_POOL_SPREAD: u32 = 50;

/// Upper bound (exclusive) of transactions added per block.
const MAX_TRANSACTIONS_PER_BLOCK: u64 = 10;

const THREAT_DETECTION_PROBABILITY: f64 = 0.3;
const THREAT_RESOLUTION_PROBABILITY: f64 = 0.5;

/// Shortest tick period a producer will run at.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A periodic state transformation.
pub trait Producer: Send {
    /// Name used in log fields.
    fn name(&self) -> &'static str;

    /// Apply one tick's worth of change to the live state.
    fn apply(&mut self, state: &mut SystemState);
}

// ---------------------------------------------------------------------------
// Telemetry drift
// ---------------------------------------------------------------------------

/// Orbital jitter, occasional key reissue and contact refresh.
///
/// In `realtime` mode it also resamples the key pool and marks every
/// channel usable. In `scenario` mode those fields, and satellite
/// statuses, belong to the scenario engine and are left alone.
pub struct TelemetryDrift {
    rng: SmallRng,
}

impl TelemetryDrift {
    /// Create a drift producer seeded from the OS.
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_os_rng())
    }

    /// Create a drift producer with a given generator.
    pub const fn with_rng(rng: SmallRng) -> Self {
        Self { rng }
    }

    /// Install the synthetic fallback fleet of `count` satellites, every
    /// channel usable whatever the mode.
    pub fn populate(&mut self, state: &mut SystemState, count: u16) {
        state.satellites = synthetic_fleet(count, &mut self.rng, Utc::now());
        state.active_channel_count = state.satellites.len();
    }
}

impl Default for TelemetryDrift {
    fn default() -> Self {
        Self::new()
    }
}

impl Producer for TelemetryDrift {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn apply(&mut self, state: &mut SystemState) {
        let now = Utc::now();
        for sat in &mut state.satellites {
            sat.position.x += self.rng.random_range(-POSITION_JITTER_KM..POSITION_JITTER_KM);
            sat.position.y += self.rng.random_range(-POSITION_JITTER_KM..POSITION_JITTER_KM);
            sat.position.z += self.rng.random_range(-POSITION_JITTER_KM..POSITION_JITTER_KM);

            if self.rng.random_ratio(1, KEY_REISSUE_ONE_IN) {
                sat.quantum_key_id = fresh_key_id(&mut self.rng, None);
                sat.key_generation = now;
            }
            sat.last_contact = now;
        }

        if state.mode == SystemMode::Realtime {
            state.key_pool_size = KEY_POOL_BASE.saturating_add(self.rng.random_range(0..KEY_POOL_SPREAD));
            state.active_channel_count = state.satellites.len();
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger growth
// ---------------------------------------------------------------------------

/// One block per tick with a handful of transactions.
pub struct LedgerGrowth {
    rng: SmallRng,
}

impl LedgerGrowth {
    /// Create a ledger producer seeded from the OS.
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_os_rng())
    }

    /// Create a ledger producer with a given generator.
    pub const fn with_rng(rng: SmallRng) -> Self {
        Self { rng }
    }
}

impl Default for LedgerGrowth {
    fn default() -> Self {
        Self::new()
    }
}

impl Producer for LedgerGrowth {
    fn name(&self) -> &'static str {
        "ledger"
    }

    fn apply(&mut self, state: &mut SystemState) {
        let ledger = &mut state.ledger;
        ledger.block_height = ledger.block_height.saturating_add(1);
        ledger.last_block_time = Utc::now();
        ledger.transaction_count = ledger
            .transaction_count
            .saturating_add(self.rng.random_range(0..MAX_TRANSACTIONS_PER_BLOCK));
    }
}

// ---------------------------------------------------------------------------
// Metrics drift
// ---------------------------------------------------------------------------

/// Resamples the detection gauges and moves threats through detection and
/// resolution.
pub struct MetricsDrift {
    rng: SmallRng,
}

impl MetricsDrift {
    /// Create a metrics producer seeded from the OS.
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_os_rng())
    }

    /// Create a metrics producer with a given generator.
    pub const fn with_rng(rng: SmallRng) -> Self {
        Self { rng }
    }
}

impl Default for MetricsDrift {
    fn default() -> Self {
        Self::new()
    }
}

impl Producer for MetricsDrift {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn apply(&mut self, state: &mut SystemState) {
        let metrics = &mut state.metrics;
        metrics.threat_detection_accuracy = 98.0 + self.rng.random_range(0.0..2.0);
        metrics.anomaly_detection_rate = 94.0 + self.rng.random_range(0.0..3.0);
        metrics.response_time = 0.1 + self.rng.random_range(0.0..0.3);
        metrics.learning_progress = 85.0 + self.rng.random_range(0.0..10.0);

        if self.rng.random_bool(THREAT_DETECTION_PROBABILITY) {
            metrics.active_threats = metrics.active_threats.saturating_add(1);
            info!(active = metrics.active_threats, "potential threat detected");
        }

        if metrics.active_threats > 0 && self.rng.random_bool(THREAT_RESOLUTION_PROBABILITY) {
            metrics.active_threats = metrics.active_threats.saturating_sub(1);
            metrics.resolved_threats = metrics.resolved_threats.saturating_add(1);
            info!(resolved = metrics.resolved_threats, "threat resolved");
        }
    }
}

// ---------------------------------------------------------------------------
// Task loops
// ---------------------------------------------------------------------------

/// Run `producer` every `period` until `stop` fires or the store closes.
///
/// The first tick happens one full period after start. A tick that cannot
/// commit ends the loop quietly.
pub async fn run_producer<P: Producer>(
    mut producer: P,
    store: Arc<StateStore>,
    period: Duration,
    mut stop: StopListener,
) {
    let name = producer.name();
    let period = period.max(MIN_PERIOD);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(producer = name, period_ms = period.as_millis(), "producer started");

    loop {
        tokio::select! {
            biased;
            () = stop.stopped() => break,
            _ = ticker.tick() => {}
        }

        match store.mutate_unless_stopped(&stop, |s| producer.apply(s)).await {
            Ok(snapshot) => trace!(producer = name, version = snapshot.version(), "tick committed"),
            Err(StoreError::Stopped) => break,
            Err(StoreError::Closed) => {
                debug!(producer = name, "store closed, skipping remaining ticks");
                break;
            }
        }
    }

    debug!(producer = name, "producer stopped");
}

/// Establish the satellite fleet, then keep it fresh.
///
/// If the first upstream fetch succeeds the upstream list is installed and
/// re-polled every `period`; failed polls commit nothing. If it fails,
/// `fallback_count` synthetic satellites are installed and
/// [`TelemetryDrift`] runs for the rest of the process.
pub async fn run_telemetry(
    source: TelemetrySource,
    store: Arc<StateStore>,
    period: Duration,
    fallback_count: u16,
    mut stop: StopListener,
) {
    let first = tokio::select! {
        biased;
        () = stop.stopped() => return,
        result = source.fetch() => result,
    };

    match first {
        Ok(satellites) => {
            info!(source = source.describe(), count = satellites.len(), "connected to telemetry simulator");
            if store
                .mutate_unless_stopped(&stop, |s| install_upstream(s, satellites))
                .await
                .is_err()
            {
                return;
            }
            poll_upstream(source, store, period, stop).await;
        }
        Err(e) => {
            warn!(source = source.describe(), error = %e, "telemetry simulator unreachable, using synthetic fleet");
            let mut drift = TelemetryDrift::new();
            if store
                .mutate_unless_stopped(&stop, |s| drift.populate(s, fallback_count))
                .await
                .is_err()
            {
                return;
            }
            info!(count = fallback_count, "synthetic fleet installed");
            run_producer(drift, store, period, stop).await;
        }
    }
}

async fn poll_upstream(
    source: TelemetrySource,
    store: Arc<StateStore>,
    period: Duration,
    mut stop: StopListener,
) {
    let period = period.max(MIN_PERIOD);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = stop.stopped() => break,
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            biased;
            () = stop.stopped() => break,
            result = source.fetch() => result,
        };

        match fetched {
            Ok(satellites) => {
                if store
                    .mutate_unless_stopped(&stop, |s| refresh_upstream(s, satellites))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => debug!(error = %e, "telemetry poll failed, keeping previous fleet"),
        }
    }

    debug!("telemetry polling stopped");
}

/// First install of the upstream fleet: every channel usable.
fn install_upstream(state: &mut SystemState, satellites: Vec<Satellite>) {
    state.active_channel_count = satellites.len();
    state.satellites = satellites;
}

/// Replace the fleet with a later poll.
///
/// In `scenario` mode a satellite already known keeps its current status
/// and the channel count is left to the scenario engine.
fn refresh_upstream(state: &mut SystemState, mut satellites: Vec<Satellite>) {
    if state.mode == SystemMode::Scenario {
        for sat in &mut satellites {
            if let Some(current) = state.satellite(&sat.id) {
                sat.status = current.status;
            }
        }
    } else {
        state.active_channel_count = satellites.len();
    }
    state.satellites = satellites;
}
