//! The shared state aggregate and the records it is built from.
//!
//! [`SystemState`] is the single document every subscriber receives. The
//! Rust field names describe what each field holds; the serde renames
//! keep the wire shape the dashboard was built against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{NetworkStatus, SatelliteStatus, SystemMode};

// ---------------------------------------------------------------------------
// Satellites
// ---------------------------------------------------------------------------

/// Cartesian position of a satellite, in kilometres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

/// A simulated satellite with its orbital and key-distribution fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Satellite {
    /// Unique, stable identifier (e.g. `SAT-001`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Orbit class (e.g. `LEO`).
    pub orbit_type: String,
    /// Altitude in kilometres.
    pub altitude: f64,
    /// Orbital inclination in degrees.
    pub inclination: f64,
    /// Current position.
    pub position: Position,
    /// When the satellite was last heard from.
    pub last_contact: DateTime<Utc>,
    /// Identifier of the key currently issued to the satellite.
    pub quantum_key_id: String,
    /// When the current key was issued.
    pub key_generation: DateTime<Utc>,
    /// Link status.
    pub status: SatelliteStatus,
}

impl Satellite {
    /// Whether the satellite currently has a full link.
    pub fn is_operational(&self) -> bool {
        self.status == SatelliteStatus::Operational
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Status of the ledger network backing key issuance.
///
/// `block_height` and `transaction_count` never decrease over the
/// lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct LedgerStatus {
    /// Height of the most recent block.
    pub block_height: u64,
    /// When the most recent block was produced.
    pub last_block_time: DateTime<Utc>,
    /// Number of active validators.
    pub active_validators: u32,
    /// Total transactions observed.
    pub transaction_count: u64,
    /// Network health.
    pub network_status: NetworkStatus,
}

impl LedgerStatus {
    /// Number of validators the ledger starts with.
    pub const GENESIS_VALIDATORS: u32 = 5;

    /// The ledger as it looks when the process starts: one block, no
    /// transactions, network active.
    pub const fn genesis(now: DateTime<Utc>) -> Self {
        Self {
            block_height: 1,
            last_block_time: now,
            active_validators: Self::GENESIS_VALIDATORS,
            transaction_count: 0,
            network_status: NetworkStatus::Active,
        }
    }
}

// ---------------------------------------------------------------------------
// Detection metrics
// ---------------------------------------------------------------------------

/// Anomaly-detection gauges and threat counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct DetectionMetrics {
    /// Threat detection accuracy, percent.
    pub threat_detection_accuracy: f64,
    /// Anomaly detection rate, percent.
    pub anomaly_detection_rate: f64,
    /// Mean response time, seconds.
    pub response_time: f64,
    /// Model learning progress, percent.
    pub learning_progress: f64,
    /// Threats detected and not yet resolved.
    pub active_threats: u32,
    /// Threats resolved so far.
    pub resolved_threats: u32,
}

impl Default for DetectionMetrics {
    fn default() -> Self {
        Self {
            threat_detection_accuracy: 98.5,
            anomaly_detection_rate: 95.2,
            response_time: 0.2,
            learning_progress: 87.3,
            active_threats: 0,
            resolved_threats: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// The complete shared state pushed to every subscriber.
///
/// Cross-field invariant: `active_channel_count <= satellites.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SystemState {
    /// Satellites in a stable order, unique by id.
    pub satellites: Vec<Satellite>,
    /// Ledger network status.
    #[serde(rename = "blockchainData")]
    pub ledger: LedgerStatus,
    /// Unused keys available for issuance.
    #[serde(rename = "quantumKeyPool")]
    pub key_pool_size: u32,
    /// Currently usable communication channels.
    #[serde(rename = "activeChannels")]
    pub active_channel_count: usize,
    /// Regime currently driving mutation.
    #[serde(rename = "systemMode")]
    pub mode: SystemMode,
    /// When the last mutation was committed.
    #[serde(rename = "lastUpdateTime")]
    pub last_update: DateTime<Utc>,
    /// Anomaly-detection metrics.
    #[serde(rename = "aiMetrics")]
    pub metrics: DetectionMetrics,
}

impl SystemState {
    /// The state a process starts with: no satellites, a genesis ledger,
    /// seeded metrics.
    pub fn seeded(mode: SystemMode, now: DateTime<Utc>) -> Self {
        Self {
            satellites: Vec::new(),
            ledger: LedgerStatus::genesis(now),
            key_pool_size: 0,
            active_channel_count: 0,
            mode,
            last_update: now,
            metrics: DetectionMetrics::default(),
        }
    }

    /// Look up a satellite by id.
    pub fn satellite(&self, id: &str) -> Option<&Satellite> {
        self.satellites.iter().find(|s| s.id == id)
    }

    /// Number of satellites currently on a limited link.
    pub fn limited_count(&self) -> usize {
        self.satellites.iter().filter(|s| !s.is_operational()).count()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn sample_satellite(now: DateTime<Utc>) -> Satellite {
        Satellite {
            id: String::from("SAT-001"),
            name: String::from("ThunderBird-1"),
            orbit_type: String::from("LEO"),
            altitude: 640.0,
            inclination: 52.0,
            position: Position {
                x: 1.0,
                y: 2.0,
                z: 3.0,
            },
            last_contact: now,
            quantum_key_id: String::from("QK17"),
            key_generation: now,
            status: SatelliteStatus::Operational,
        }
    }

    #[test]
    fn document_uses_dashboard_field_names() {
        let now = Utc::now();
        let mut state = SystemState::seeded(SystemMode::Realtime, now);
        state.satellites.push(sample_satellite(now));

        let value = serde_json::to_value(&state).unwrap();
        for key in [
            "satellites",
            "blockchainData",
            "quantumKeyPool",
            "activeChannels",
            "systemMode",
            "lastUpdateTime",
            "aiMetrics",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }

        let sat = &value["satellites"][0];
        for key in [
            "id",
            "name",
            "orbitType",
            "altitude",
            "inclination",
            "position",
            "lastContact",
            "quantumKeyId",
            "keyGeneration",
            "status",
        ] {
            assert!(sat.get(key).is_some(), "missing satellite field {key}");
        }
        assert_eq!(sat["status"], "operational");
        assert_eq!(value["blockchainData"]["networkStatus"], "active");
        assert_eq!(value["blockchainData"]["activeValidators"], 5);
        assert_eq!(value["aiMetrics"]["activeThreats"], 0);
        assert_eq!(value["systemMode"], "realtime");
    }

    #[test]
    fn upstream_satellite_list_deserializes() {
        let raw = r#"[{
            "id": "UP-1", "name": "Relay", "orbitType": "MEO",
            "altitude": 20200.0, "inclination": 55.0,
            "position": {"x": 0.5, "y": 1.5, "z": 2.5},
            "lastContact": "2024-05-01T12:00:00Z",
            "quantumKeyId": "QK1", "keyGeneration": "2024-05-01T11:59:00Z",
            "status": "limited_connection"
        }]"#;
        let sats: Vec<Satellite> = serde_json::from_str(raw).unwrap();
        assert_eq!(sats.len(), 1);
        assert_eq!(sats[0].orbit_type, "MEO");
        assert!(!sats[0].is_operational());
    }

    #[test]
    fn seeded_state_is_empty_with_genesis_ledger() {
        let now = Utc::now();
        let state = SystemState::seeded(SystemMode::Scenario, now);
        assert!(state.satellites.is_empty());
        assert_eq!(state.active_channel_count, 0);
        assert_eq!(state.ledger.block_height, 1);
        assert_eq!(state.ledger.transaction_count, 0);
        assert_eq!(state.metrics, DetectionMetrics::default());
        assert_eq!(state.limited_count(), 0);
        assert!(state.satellite("SAT-001").is_none());
    }
}
