//! State store, producers, scenario engine, and broadcast hub for the
//! ThunderBird state broadcaster.
//!
//! Every change to the shared [`SystemState`] goes through one
//! [`StateStore`]; every committed change is fanned out by one
//! [`BroadcastHub`]. Producers and the scenario engine are independent
//! tasks that only ever talk to the store. The [`Supervisor`] decides
//! which of them run for the current mode.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `thunderbird-config.yaml`
//!   plus environment overrides.
//! - [`hub`] -- [`BroadcastHub`]: subscriber set and best-effort fan-out.
//! - [`producers`] -- Timer-driven telemetry, ledger, and metrics
//!   producers.
//! - [`scenario`] -- The scripted scenario state machine.
//! - [`signal`] -- Cooperative stop signal shared by a regime's tasks.
//! - [`store`] -- [`StateStore`] and versioned [`Snapshot`]s.
//! - [`supervisor`] -- Mode regimes, mode switching, and shutdown.
//! - [`telemetry`] -- Upstream simulator client and the synthetic fleet.
//!
//! [`SystemState`]: thunderbird_types::SystemState
//! [`StateStore`]: store::StateStore
//! [`Snapshot`]: store::Snapshot
//! [`BroadcastHub`]: hub::BroadcastHub
//! [`Supervisor`]: supervisor::Supervisor

pub mod config;
pub mod hub;
pub mod producers;
pub mod scenario;
pub mod signal;
pub mod store;
pub mod supervisor;
pub mod telemetry;
