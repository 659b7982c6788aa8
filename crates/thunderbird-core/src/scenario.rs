//! The scripted scenario state machine.
//!
//! Scenarios run in a fixed cycle. Each one has an onset mutation, an
//! optional hold, and for most of them a resolution mutation:
//!
//! | Scenario | Hold | Resolution |
//! |----------|------|------------|
//! | `normal` | 20s | -- |
//! | `hacker_attempt` | 10s | network back to active |
//! | `authentication` | -- | -- |
//! | `satellite_failure` | 15s | failed satellites recover |
//! | `quantum_breach` | 12s | keys regenerated with BB84 |
//! | `network_overload` | 10s | load rebalanced |
//!
//! [`ScenarioEngine`] holds the position in the cycle (scenario + phase)
//! and knows nothing about time; [`run_scenarios`] drives it against the
//! store and is the only place that sleeps. Every phase is exactly one
//! store mutation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use rand::rngs::SmallRng;
use thunderbird_types::{NetworkStatus, SatelliteStatus, SystemState};
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::ScenarioConfig;
use crate::signal::StopListener;
use crate::store::StateStore;
use crate::telemetry::fresh_key_id;

const NORMAL_KEY_POOL_BASE: u32 = 100;
const NORMAL_KEY_POOL_SPREAD: u32 = 50;
const AUTHENTICATION_KEY_GRANT: u32 = 50;
const BREACH_RECOVERY_POOL_BASE: u32 = 150;
const BREACH_RECOVERY_POOL_SPREAD: u32 = 100;
const OVERLOAD_TRANSACTIONS: u64 = 500;

const HACKER_DEGRADE_PROBABILITY: f64 = 0.3;
const BREACH_DEGRADE_PROBABILITY: f64 = 0.4;
const OVERLOAD_DEGRADE_PROBABILITY: f64 = 0.5;

/// A named, scripted sequence of mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Everything healthy.
    Normal,
    /// Intrusion attempt degrades some links.
    HackerAttempt,
    /// Fleet-wide key refresh.
    Authentication,
    /// One or two satellites lose their link.
    SatelliteFailure,
    /// Key material compromised; pool drained.
    QuantumBreach,
    /// Transaction flood halves usable channels.
    NetworkOverload,
}

impl Scenario {
    /// The cycle, in order.
    pub const CYCLE: [Self; 6] = [
        Self::Normal,
        Self::HackerAttempt,
        Self::Authentication,
        Self::SatelliteFailure,
        Self::QuantumBreach,
        Self::NetworkOverload,
    ];

    /// Wire/log name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::HackerAttempt => "hacker_attempt",
            Self::Authentication => "authentication",
            Self::SatelliteFailure => "satellite_failure",
            Self::QuantumBreach => "quantum_breach",
            Self::NetworkOverload => "network_overload",
        }
    }

    /// The scenario after this one; wraps to [`Scenario::Normal`].
    pub const fn next(self) -> Self {
        match self {
            Self::Normal => Self::HackerAttempt,
            Self::HackerAttempt => Self::Authentication,
            Self::Authentication => Self::SatelliteFailure,
            Self::SatelliteFailure => Self::QuantumBreach,
            Self::QuantumBreach => Self::NetworkOverload,
            Self::NetworkOverload => Self::Normal,
        }
    }

    /// Whether the script ends with a resolution mutation.
    pub const fn has_resolution(self) -> bool {
        !matches!(self, Self::Normal | Self::Authentication)
    }

    /// How long the onset holds before the resolution (or the next
    /// scenario).
    pub const fn hold(self, config: &ScenarioConfig) -> Duration {
        let ms = match self {
            Self::Normal => config.normal_hold_ms,
            Self::HackerAttempt => config.hacker_attempt_hold_ms,
            Self::Authentication => 0,
            Self::SatelliteFailure => config.satellite_failure_hold_ms,
            Self::QuantumBreach => config.quantum_breach_hold_ms,
            Self::NetworkOverload => config.network_overload_hold_ms,
        };
        Duration::from_millis(ms)
    }

    /// Apply the onset mutation.
    pub fn onset(self, state: &mut SystemState, rng: &mut impl Rng) {
        match self {
            Self::Normal => {
                state.ledger.network_status = NetworkStatus::Active;
                state.key_pool_size =
                    NORMAL_KEY_POOL_BASE.saturating_add(rng.random_range(0..NORMAL_KEY_POOL_SPREAD));
                state.active_channel_count = state.satellites.len();
                set_all(state, SatelliteStatus::Operational);
                info!("normal operations, all systems operational");
            }
            Self::HackerAttempt => {
                state.ledger.network_status = NetworkStatus::UnderAttack;
                degrade(state, HACKER_DEGRADE_PROBABILITY, rng);
                warn!("unauthorized access attempt detected");
            }
            Self::Authentication => {
                state.key_pool_size = state.key_pool_size.saturating_add(AUTHENTICATION_KEY_GRANT);
                reissue_keys(state, None, rng);
                info!("quantum authentication performed");
            }
            Self::SatelliteFailure => {
                let len = state.satellites.len();
                let fail_count = rng.random_range(1..=2_usize).min(len);
                for index in rand::seq::index::sample(rng, len, fail_count) {
                    if let Some(sat) = state.satellites.get_mut(index) {
                        sat.status = SatelliteStatus::LimitedConnection;
                        warn!(satellite = %sat.id, "satellite experiencing connection issues");
                    }
                }
                state.active_channel_count = len.saturating_sub(fail_count);
            }
            Self::QuantumBreach => {
                state.key_pool_size = 0;
                state.ledger.network_status = NetworkStatus::Compromised;
                degrade(state, BREACH_DEGRADE_PROBABILITY, rng);
                warn!("quantum security breach detected");
            }
            Self::NetworkOverload => {
                state.ledger.transaction_count =
                    state.ledger.transaction_count.saturating_add(OVERLOAD_TRANSACTIONS);
                state.ledger.network_status = NetworkStatus::Degraded;
                state.active_channel_count = state.satellites.len() / 2;
                degrade(state, OVERLOAD_DEGRADE_PROBABILITY, rng);
                warn!("network overload detected");
            }
        }
    }

    /// Apply the resolution mutation. A no-op for scenarios without one.
    pub fn resolve(self, state: &mut SystemState, rng: &mut impl Rng) {
        match self {
            Self::Normal | Self::Authentication => {}
            Self::HackerAttempt => {
                state.ledger.network_status = NetworkStatus::Active;
                info!("threat mitigated");
            }
            Self::SatelliteFailure => {
                set_all(state, SatelliteStatus::Operational);
                state.active_channel_count = state.satellites.len();
                info!("satellite systems recovered");
            }
            Self::QuantumBreach => {
                state.key_pool_size = BREACH_RECOVERY_POOL_BASE
                    .saturating_add(rng.random_range(0..BREACH_RECOVERY_POOL_SPREAD));
                state.ledger.network_status = NetworkStatus::Active;
                reissue_keys(state, Some("BB84"), rng);
                info!("quantum keys regenerated with BB84");
            }
            Self::NetworkOverload => {
                state.ledger.network_status = NetworkStatus::Active;
                state.active_channel_count = state.satellites.len();
                set_all(state, SatelliteStatus::Operational);
                info!("network load rebalanced");
            }
        }
    }
}

fn set_all(state: &mut SystemState, status: SatelliteStatus) {
    for sat in &mut state.satellites {
        sat.status = status;
    }
}

fn degrade(state: &mut SystemState, probability: f64, rng: &mut impl Rng) {
    for sat in &mut state.satellites {
        if rng.random_bool(probability) {
            sat.status = SatelliteStatus::LimitedConnection;
        }
    }
}

fn reissue_keys(state: &mut SystemState, protocol: Option<&str>, rng: &mut impl Rng) {
    let now = Utc::now();
    for sat in &mut state.satellites {
        sat.quantum_key_id = fresh_key_id(rng, protocol);
        sat.key_generation = now;
        sat.status = SatelliteStatus::Operational;
    }
}

/// Which half of a scenario's script is next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The onset mutation.
    Onset,
    /// The resolution mutation, after the hold.
    Resolution,
}

/// Position in the scenario cycle.
#[derive(Debug, Clone)]
pub struct ScenarioEngine {
    scenario: Scenario,
    phase: Phase,
    holds: ScenarioConfig,
}

impl ScenarioEngine {
    /// An engine at the onset of [`Scenario::Normal`].
    pub const fn new(holds: ScenarioConfig) -> Self {
        Self {
            scenario: Scenario::Normal,
            phase: Phase::Onset,
            holds,
        }
    }

    /// The scenario whose script is running.
    pub const fn scenario(&self) -> Scenario {
        self.scenario
    }

    /// The next phase to apply.
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Apply the mutation for the current phase.
    pub fn apply(&self, state: &mut SystemState, rng: &mut impl Rng) {
        match self.phase {
            Phase::Onset => self.scenario.onset(state, rng),
            Phase::Resolution => self.scenario.resolve(state, rng),
        }
    }

    /// Move past the phase just applied. Returns how long to wait before
    /// applying the next one.
    pub fn advance(&mut self) -> Duration {
        match self.phase {
            Phase::Onset if self.scenario.has_resolution() => {
                self.phase = Phase::Resolution;
                self.scenario.hold(&self.holds)
            }
            Phase::Onset => {
                let hold = self.scenario.hold(&self.holds);
                self.scenario = self.scenario.next();
                hold
            }
            Phase::Resolution => {
                self.scenario = self.scenario.next();
                self.phase = Phase::Onset;
                Duration::ZERO
            }
        }
    }
}

/// Drive `engine` against `store` until `stop` fires.
///
/// A stop during a hold abandons it; the pending phase is never applied.
/// The stop is also re-checked under the store lock, so nothing is
/// committed once it has been observed.
pub async fn run_scenarios(
    mut engine: ScenarioEngine,
    store: Arc<StateStore>,
    mut rng: SmallRng,
    mut stop: StopListener,
) {
    info!(scenario = engine.scenario().name(), "scenario engine started");

    loop {
        let scenario = engine.scenario();
        let phase = engine.phase();

        match store
            .mutate_unless_stopped(&stop, |s| engine.apply(s, &mut rng))
            .await
        {
            Ok(snapshot) => debug!(
                scenario = scenario.name(),
                ?phase,
                version = snapshot.version(),
                "scenario phase committed"
            ),
            Err(e) => {
                debug!(scenario = scenario.name(), ?phase, reason = %e, "scenario phase abandoned");
                break;
            }
        }

        let delay = engine.advance();
        if phase == Phase::Onset && !scenario.has_resolution() {
            info!(next = engine.scenario().name(), "scenario complete");
        }
        if !delay.is_zero() {
            tokio::select! {
                biased;
                () = stop.stopped() => break,
                () = time::sleep(delay) => {}
            }
        }
    }

    info!(scenario = engine.scenario().name(), "scenario engine stopped");
}
