//! ThunderBird state broadcaster binary.
//!
//! Wires the state store, the broadcast hub, the supervisor and the
//! gateway together and serves until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `thunderbird-config.yaml` and the
//!    environment
//! 3. Create the state store and start the distribution loop
//! 4. Start the supervisor (telemetry plus the initial mode's regime)
//! 5. Bootstrap the quantum module in the background
//! 6. Bind the gateway
//!
//! # Shutdown Sequence
//!
//! Stop every producer and close the store, let the hub drain and drop
//! its subscribers, then stop accepting connections.

mod error;
mod quantum;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use thunderbird_core::config::{BroadcasterConfig, CONFIG_FILE_NAME};
use thunderbird_core::hub::BroadcastHub;
use thunderbird_core::signal::StopSignal;
use thunderbird_core::store::StateStore;
use thunderbird_core::supervisor::Supervisor;
use thunderbird_core::telemetry::TelemetrySource;
use thunderbird_gateway::{AppState, ServerConfig, spawn_gateway};
use thunderbird_types::SystemState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::ServerMainError;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the gateway cannot
/// bind its listener.
#[tokio::main]
async fn main() -> Result<(), ServerMainError> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("thunderbird-server starting");

    // 2. Load configuration.
    let config = load_config()?;
    info!(
        port = config.server.port,
        initial_mode = %config.system.initial_mode,
        simulator_url = %config.telemetry.simulator_url,
        quantum_url = %config.quantum.service_url,
        "Configuration loaded"
    );

    // 3. State store and distribution loop.
    let initial = SystemState::seeded(config.system.initial_mode, Utc::now());
    let (store, snapshots) = StateStore::new(initial);
    let store = Arc::new(store);
    let hub = Arc::new(BroadcastHub::new(store.read().await));
    let distribution = tokio::spawn(Arc::clone(&hub).run(snapshots));

    // 4. Supervisor.
    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&store),
        config.producers.clone(),
        config.scenario.clone(),
        config.telemetry.fallback_satellites,
    ));
    let source = TelemetrySource::http(&config.telemetry).unwrap_or_else(|e| {
        warn!(error = %e, "telemetry client unavailable, using synthetic fleet");
        TelemetrySource::Offline
    });
    supervisor.start(source).await;

    // 5. Quantum module.
    quantum::spawn_initialization(config.quantum.clone());

    // 6. Gateway.
    let app_state = Arc::new(AppState::new(
        Arc::clone(&supervisor),
        Arc::clone(&hub),
        config.hub.subscriber_queue_capacity,
    ));
    let gateway_stop = StopSignal::new();
    let mut gateway_listener = gateway_stop.listener();
    let mut gateway = spawn_gateway(
        &ServerConfig::from(&config.server),
        app_state,
        async move { gateway_listener.stopped().await },
    )
    .await?;
    info!(addr = %gateway.addr, "thunderbird-server ready");

    let gateway_exited = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
            }
            info!("Shutdown requested");
            false
        }
        _ = &mut gateway.handle => {
            warn!("gateway stopped unexpectedly, shutting down");
            true
        }
    };

    info!(
        subscribers = hub.subscriber_count().await,
        "stopping producers and disconnecting subscribers"
    );
    supervisor.shutdown().await;
    if let Err(e) = distribution.await {
        warn!(error = %e, "distribution loop ended abnormally");
    }
    gateway_stop.trigger();
    if !gateway_exited {
        if let Err(e) = gateway.handle.await {
            warn!(error = %e, "gateway task ended abnormally");
        }
    }

    info!("thunderbird-server shutdown complete");
    Ok(())
}

/// Load the broadcaster configuration from `thunderbird-config.yaml`.
///
/// Looks for the config file relative to the current working directory.
/// Without a file the defaults apply, still subject to environment
/// overrides.
fn load_config() -> Result<BroadcasterConfig, ServerMainError> {
    let config_path = Path::new(CONFIG_FILE_NAME);
    if config_path.exists() {
        Ok(BroadcasterConfig::from_file(config_path)?)
    } else {
        info!("Config file not found, using defaults");
        let mut config = BroadcasterConfig::default();
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }
}
