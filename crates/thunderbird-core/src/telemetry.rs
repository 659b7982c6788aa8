//! Upstream satellite telemetry and the synthetic fallback fleet.
//!
//! The upstream simulator is an external HTTP service answering
//! `GET {simulator_url}/telemetry` with a JSON array of satellites. It is
//! consulted through [`TelemetrySource`], an enum rather than a trait
//! object so the async `fetch` needs no boxing. When the simulator cannot
//! be reached at startup the broadcaster runs on [`synthetic_fleet`]
//! instead, indefinitely.

use chrono::{DateTime, Utc};
use rand::Rng;
use thunderbird_types::{Position, Satellite, SatelliteStatus};

use crate::config::TelemetryConfig;

/// Errors from the upstream telemetry simulator.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The HTTP client could not be constructed.
    #[error("telemetry client error: {0}")]
    Client(String),

    /// The request failed (connection refused, timeout, ...).
    #[error("telemetry request failed: {0}")]
    Request(String),

    /// The simulator answered with a non-success status.
    #[error("telemetry simulator returned {0}")]
    Status(u16),

    /// The body was not a satellite list.
    #[error("telemetry decode failed: {0}")]
    Decode(String),

    /// No upstream is configured.
    #[error("no telemetry source configured")]
    Offline,
}

/// Where satellite telemetry comes from.
pub enum TelemetrySource {
    /// The HTTP simulator.
    Http(HttpTelemetrySource),
    /// No upstream; every fetch fails, so the fallback fleet is used.
    Offline,
}

impl TelemetrySource {
    /// Build an HTTP source from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Client`] if the HTTP client cannot be
    /// built.
    pub fn http(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        Ok(Self::Http(HttpTelemetrySource::new(config)?))
    }

    /// Fetch the current satellite list.
    ///
    /// # Errors
    ///
    /// Returns a [`TelemetryError`] describing why no list was obtained.
    pub async fn fetch(&self) -> Result<Vec<Satellite>, TelemetryError> {
        match self {
            Self::Http(source) => source.fetch().await,
            Self::Offline => Err(TelemetryError::Offline),
        }
    }

    /// Human-readable description for logging.
    pub fn describe(&self) -> &str {
        match self {
            Self::Http(source) => &source.endpoint,
            Self::Offline => "offline",
        }
    }
}

/// Client for the upstream simulator's `/telemetry` endpoint.
pub struct HttpTelemetrySource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTelemetrySource {
    /// Create a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Client`] if the client cannot be built.
    pub fn new(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TelemetryError::Client(format!("{e}")))?;
        let endpoint = format!("{}/telemetry", config.simulator_url.trim_end_matches('/'));
        Ok(Self { client, endpoint })
    }

    async fn fetch(&self) -> Result<Vec<Satellite>, TelemetryError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| TelemetryError::Request(format!("{e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Status(status.as_u16()));
        }

        response
            .json::<Vec<Satellite>>()
            .await
            .map_err(|e| TelemetryError::Decode(format!("{e}")))
    }
}

/// Generate a key identifier such as `QK417`, or `QK-BB84-417` when
/// `protocol` is given.
pub fn fresh_key_id(rng: &mut impl Rng, protocol: Option<&str>) -> String {
    let serial: u16 = rng.random_range(0..1000);
    match protocol {
        Some(protocol) => format!("QK-{protocol}-{serial}"),
        None => format!("QK{serial}"),
    }
}

/// The fallback fleet: `count` LEO satellites `SAT-001`, `SAT-002`, ...
/// with randomized orbits, all operational.
pub fn synthetic_fleet(count: u16, rng: &mut impl Rng, now: DateTime<Utc>) -> Vec<Satellite> {
    (1..=count)
        .map(|n| Satellite {
            id: format!("SAT-{n:03}"),
            name: format!("ThunderBird-{n}"),
            orbit_type: String::from("LEO"),
            altitude: 500.0 + f64::from(rng.random_range(0_u16..300)),
            inclination: 45.0 + f64::from(rng.random_range(0_u16..45)),
            position: Position {
                x: rng.random_range(0.0..1000.0),
                y: rng.random_range(0.0..1000.0),
                z: rng.random_range(0.0..1000.0),
            },
            last_contact: now,
            quantum_key_id: fresh_key_id(rng, None),
            key_generation: now,
            status: SatelliteStatus::Operational,
        })
        .collect()
}
