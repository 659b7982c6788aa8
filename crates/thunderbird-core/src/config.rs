//! Configuration loading and typed config structures for the broadcaster.
//!
//! The configuration lives in `thunderbird-config.yaml` in the working
//! directory. Every section and field has a default, so an absent file or
//! a partial file is valid. A handful of deployment settings can be
//! overridden from the environment after the file is read.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thunderbird_types::SystemMode;

/// Default config file name, resolved against the working directory.
pub const CONFIG_FILE_NAME: &str = "thunderbird-config.yaml";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override held an unusable value.
    #[error("invalid value for {name}: {reason}")]
    InvalidEnv {
        /// The environment variable name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level broadcaster configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BroadcasterConfig {
    /// Listener address for the gateway.
    #[serde(default)]
    pub server: ServerSection,

    /// Startup regime.
    #[serde(default)]
    pub system: SystemSection,

    /// Upstream telemetry simulator.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Producer tick intervals.
    #[serde(default)]
    pub producers: ProducerConfig,

    /// Scenario hold durations.
    #[serde(default)]
    pub scenario: ScenarioConfig,

    /// Subscriber fan-out settings.
    #[serde(default)]
    pub hub: HubConfig,

    /// External quantum module bootstrap.
    #[serde(default)]
    pub quantum: QuantumConfig,
}

impl BroadcasterConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides:
    /// - `PORT` overrides `server.port`
    /// - `SIMULATOR_URL` overrides `telemetry.simulator_url`
    /// - `QUANTUM_URL` overrides `quantum.service_url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::InvalidEnv`] if an override cannot be parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without consulting the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply deployment overrides using `lookup` to resolve variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if `PORT` is not a valid port.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|e| ConfigError::InvalidEnv {
                name: "PORT",
                reason: format!("{e}"),
            })?;
        }
        if let Some(url) = lookup("SIMULATOR_URL") {
            self.telemetry.simulator_url = url;
        }
        if let Some(url) = lookup("QUANTUM_URL") {
            self.quantum.service_url = url;
        }
        Ok(())
    }
}

/// Gateway listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Startup regime selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SystemSection {
    /// Mode the supervisor starts in.
    #[serde(default = "default_initial_mode")]
    pub initial_mode: SystemMode,
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            initial_mode: default_initial_mode(),
        }
    }
}

/// Upstream telemetry simulator settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TelemetryConfig {
    /// Base URL of the simulator; `/telemetry` is appended.
    #[serde(default = "default_simulator_url")]
    pub simulator_url: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Number of synthetic satellites generated when the simulator is
    /// unreachable at startup.
    #[serde(default = "default_fallback_satellites")]
    pub fallback_satellites: u16,
}

impl TelemetryConfig {
    /// Request timeout as a [`Duration`].
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            simulator_url: default_simulator_url(),
            request_timeout_ms: default_request_timeout_ms(),
            fallback_satellites: default_fallback_satellites(),
        }
    }
}

/// Producer tick intervals, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProducerConfig {
    /// Telemetry drift / live polling interval.
    #[serde(default = "default_telemetry_interval_ms")]
    pub telemetry_interval_ms: u64,

    /// Ledger growth interval.
    #[serde(default = "default_ledger_interval_ms")]
    pub ledger_interval_ms: u64,

    /// Metrics drift interval.
    #[serde(default = "default_metrics_interval_ms")]
    pub metrics_interval_ms: u64,
}

impl ProducerConfig {
    /// Telemetry interval as a [`Duration`].
    pub const fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }

    /// Ledger interval as a [`Duration`].
    pub const fn ledger_interval(&self) -> Duration {
        Duration::from_millis(self.ledger_interval_ms)
    }

    /// Metrics interval as a [`Duration`].
    pub const fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            telemetry_interval_ms: default_telemetry_interval_ms(),
            ledger_interval_ms: default_ledger_interval_ms(),
            metrics_interval_ms: default_metrics_interval_ms(),
        }
    }
}

/// Hold durations between a scenario's onset and its resolution (or the
/// next scenario), in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScenarioConfig {
    /// Hold after `normal`.
    #[serde(default = "default_normal_hold_ms")]
    pub normal_hold_ms: u64,

    /// Hold during `hacker_attempt`.
    #[serde(default = "default_hacker_attempt_hold_ms")]
    pub hacker_attempt_hold_ms: u64,

    /// Hold during `satellite_failure`.
    #[serde(default = "default_satellite_failure_hold_ms")]
    pub satellite_failure_hold_ms: u64,

    /// Hold during `quantum_breach`.
    #[serde(default = "default_quantum_breach_hold_ms")]
    pub quantum_breach_hold_ms: u64,

    /// Hold during `network_overload`.
    #[serde(default = "default_network_overload_hold_ms")]
    pub network_overload_hold_ms: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            normal_hold_ms: default_normal_hold_ms(),
            hacker_attempt_hold_ms: default_hacker_attempt_hold_ms(),
            satellite_failure_hold_ms: default_satellite_failure_hold_ms(),
            quantum_breach_hold_ms: default_quantum_breach_hold_ms(),
            network_overload_hold_ms: default_network_overload_hold_ms(),
        }
    }
}

/// Subscriber fan-out settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HubConfig {
    /// Snapshots a subscriber may have queued before it is considered
    /// too slow and disconnected.
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: default_subscriber_queue_capacity(),
        }
    }
}

/// External quantum module bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuantumConfig {
    /// URL of the quantum key service (reported at startup).
    #[serde(default = "default_quantum_url")]
    pub service_url: String,

    /// Whether to run the init command at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Program to execute.
    #[serde(default = "default_init_program")]
    pub init_program: String,

    /// Arguments passed to the program.
    #[serde(default = "default_init_args")]
    pub init_args: Vec<String>,
}

impl Default for QuantumConfig {
    fn default() -> Self {
        Self {
            service_url: default_quantum_url(),
            enabled: true,
            init_program: default_init_program(),
            init_args: default_init_args(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8080
}

const fn default_initial_mode() -> SystemMode {
    SystemMode::Realtime
}

fn default_simulator_url() -> String {
    String::from("http://localhost:9090")
}

const fn default_request_timeout_ms() -> u64 {
    5_000
}

const fn default_fallback_satellites() -> u16 {
    5
}

const fn default_telemetry_interval_ms() -> u64 {
    2_000
}

const fn default_ledger_interval_ms() -> u64 {
    5_000
}

const fn default_metrics_interval_ms() -> u64 {
    10_000
}

const fn default_normal_hold_ms() -> u64 {
    20_000
}

const fn default_hacker_attempt_hold_ms() -> u64 {
    10_000
}

const fn default_satellite_failure_hold_ms() -> u64 {
    15_000
}

const fn default_quantum_breach_hold_ms() -> u64 {
    12_000
}

const fn default_network_overload_hold_ms() -> u64 {
    10_000
}

const fn default_subscriber_queue_capacity() -> usize {
    64
}

fn default_quantum_url() -> String {
    String::from("http://localhost:8081")
}

const fn default_true() -> bool {
    true
}

fn default_init_program() -> String {
    String::from("python")
}

fn default_init_args() -> Vec<String> {
    vec![String::from("./quantum/init_qiskit.py")]
}
