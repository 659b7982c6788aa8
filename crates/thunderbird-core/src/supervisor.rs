//! Which tasks run for which mode, and switching between them.
//!
//! Telemetry runs for the whole life of the process. Everything else
//! belongs to a *regime* tied to the current [`SystemMode`]:
//!
//! - `realtime`: ledger growth and metrics drift.
//! - `scenario`: the scenario engine.
//!
//! A mode switch stops the old regime and waits for its tasks to finish
//! before the new mode is committed and the new regime spawned. Switches
//! are serialized, so two regimes are never live at once and nothing
//! from the old regime lands after the mode change.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use thunderbird_types::SystemMode;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ProducerConfig, ScenarioConfig};
use crate::producers::{LedgerGrowth, MetricsDrift, run_producer, run_telemetry};
use crate::scenario::{ScenarioEngine, run_scenarios};
use crate::signal::StopSignal;
use crate::store::{Snapshot, StateStore, StoreError};
use crate::telemetry::TelemetrySource;

/// Starts, switches, and stops the producer tasks.
pub struct Supervisor {
    store: Arc<StateStore>,
    producers: ProducerConfig,
    scenario: ScenarioConfig,
    fallback_satellites: u16,
    control: Mutex<Control>,
}

#[derive(Default)]
struct Control {
    telemetry: Option<TaskGroup>,
    regime: Option<Regime>,
}

struct Regime {
    mode: SystemMode,
    tasks: TaskGroup,
}

/// Tasks sharing one stop signal.
struct TaskGroup {
    stop: StopSignal,
    handles: Vec<JoinHandle<()>>,
}

impl TaskGroup {
    /// Trigger the stop and wait for every task to return.
    async fn halt(self) {
        self.stop.trigger();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "task ended abnormally");
            }
        }
    }
}

impl Supervisor {
    /// Create a supervisor over `store`. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(
        store: Arc<StateStore>,
        producers: ProducerConfig,
        scenario: ScenarioConfig,
        fallback_satellites: u16,
    ) -> Self {
        Self {
            store,
            producers,
            scenario,
            fallback_satellites,
            control: Mutex::new(Control::default()),
        }
    }

    /// Spawn telemetry and the regime for the store's current mode.
    ///
    /// Calling this again while running does nothing.
    pub async fn start(&self, source: TelemetrySource) {
        let mut control = self.control.lock().await;
        if control.telemetry.is_some() {
            warn!("supervisor already started");
            return;
        }

        let stop = StopSignal::new();
        let handle = tokio::spawn(run_telemetry(
            source,
            Arc::clone(&self.store),
            self.producers.telemetry_interval(),
            self.fallback_satellites,
            stop.listener(),
        ));
        control.telemetry = Some(TaskGroup {
            stop,
            handles: vec![handle],
        });

        let mode = self.store.read().await.state().mode;
        control.regime = Some(self.spawn_regime(mode));
        info!(%mode, "supervisor started");
    }

    /// Switch to `mode`.
    ///
    /// Switching to the current mode changes nothing and returns the
    /// current snapshot. Otherwise the old regime is fully stopped, the
    /// mode change is committed (and so broadcast), and the new regime is
    /// started if the supervisor is running.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after [`shutdown`](Self::shutdown).
    pub async fn switch_mode(&self, mode: SystemMode) -> Result<Snapshot, StoreError> {
        let mut control = self.control.lock().await;
        if self.store.is_closed().await {
            return Err(StoreError::Closed);
        }

        let current = self.store.read().await;
        let from = current.state().mode;
        if from == mode {
            debug!(%mode, "already in requested mode");
            return Ok(current);
        }

        if let Some(old) = control.regime.take() {
            debug!(mode = %old.mode, "stopping regime");
            old.tasks.halt().await;
        }

        let snapshot = self.store.mutate(|s| s.mode = mode).await?;
        if control.telemetry.is_some() {
            control.regime = Some(self.spawn_regime(mode));
        }

        info!(%from, to = %mode, version = snapshot.version(), "system mode switched");
        Ok(snapshot)
    }

    /// Stop every task and close the store. Idempotent.
    pub async fn shutdown(&self) {
        let mut control = self.control.lock().await;
        if let Some(regime) = control.regime.take() {
            regime.tasks.halt().await;
        }
        if let Some(telemetry) = control.telemetry.take() {
            telemetry.halt().await;
        }
        if !self.store.is_closed().await {
            self.store.close().await;
            info!("supervisor shut down");
        }
    }

    /// Current state.
    pub async fn snapshot(&self) -> Snapshot {
        self.store.read().await
    }

    /// Mode of the running regime, if any.
    #[cfg(test)]
    pub(crate) async fn running_mode(&self) -> Option<SystemMode> {
        self.control.lock().await.regime.as_ref().map(|r| r.mode)
    }

    fn spawn_regime(&self, mode: SystemMode) -> Regime {
        let stop = StopSignal::new();
        let handles = match mode {
            SystemMode::Realtime => vec![
                tokio::spawn(run_producer(
                    LedgerGrowth::new(),
                    Arc::clone(&self.store),
                    self.producers.ledger_interval(),
                    stop.listener(),
                )),
                tokio::spawn(run_producer(
                    MetricsDrift::new(),
                    Arc::clone(&self.store),
                    self.producers.metrics_interval(),
                    stop.listener(),
                )),
            ],
            SystemMode::Scenario => vec![tokio::spawn(run_scenarios(
                ScenarioEngine::new(self.scenario.clone()),
                Arc::clone(&self.store),
                SmallRng::from_os_rng(),
                stop.listener(),
            ))],
        };
        debug!(%mode, tasks = handles.len(), "regime started");
        Regime {
            mode,
            tasks: TaskGroup { stop, handles },
        }
    }
}
