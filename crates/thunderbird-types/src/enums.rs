//! Enumeration types carried in the state document.
//!
//! All enums serialize as lowercase `snake_case` strings, matching the
//! values the dashboard switches on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Satellite status
// ---------------------------------------------------------------------------

/// Link status of a single satellite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SatelliteStatus {
    /// Fully reachable; counts towards the active channel total.
    Operational,
    /// Degraded link (attack, failure, or overload).
    LimitedConnection,
}

// ---------------------------------------------------------------------------
// Ledger network status
// ---------------------------------------------------------------------------

/// Health of the ledger network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum NetworkStatus {
    /// Blocks are produced normally.
    Active,
    /// The network is overloaded.
    Degraded,
    /// An intrusion attempt is in progress.
    UnderAttack,
    /// Key material is considered compromised.
    Compromised,
}

// ---------------------------------------------------------------------------
// System mode
// ---------------------------------------------------------------------------

/// Which mutation regime is driving the shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SystemMode {
    /// Free-running periodic producers.
    Realtime,
    /// The scripted scenario engine.
    Scenario,
}

impl SystemMode {
    /// The wire name of the mode.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Scenario => "scenario",
        }
    }
}

impl fmt::Display for SystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mode string that is neither `realtime` nor `scenario`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown system mode: {0:?}")]
pub struct ParseModeError(pub String);

impl FromStr for SystemMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "realtime" => Ok(Self::Realtime),
            "scenario" => Ok(Self::Scenario),
            other => Err(ParseModeError(other.to_owned())),
        }
    }
}
