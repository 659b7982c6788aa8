//! Shared type definitions for the ThunderBird state broadcaster.
//!
//! Every type that crosses the wire (the state document served by the
//! gateway and pushed to subscribers) lives here. Field names are
//! serialized in the camelCase shape the dashboard consumes, and all
//! types flow downstream to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`enums`] -- Status and mode enumerations
//! - [`structs`] -- The [`SystemState`] aggregate and its records

pub mod enums;
pub mod structs;

pub use enums::{NetworkStatus, ParseModeError, SatelliteStatus, SystemMode};
pub use structs::{DetectionMetrics, LedgerStatus, Position, Satellite, SystemState};

#[cfg(test)]
mod tests {
    //! Binding generation for the dashboard.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        let _ = crate::enums::SatelliteStatus::export_all();
        let _ = crate::enums::NetworkStatus::export_all();
        let _ = crate::enums::SystemMode::export_all();
        let _ = crate::structs::Position::export_all();
        let _ = crate::structs::Satellite::export_all();
        let _ = crate::structs::LedgerStatus::export_all();
        let _ = crate::structs::DetectionMetrics::export_all();
        let _ = crate::structs::SystemState::export_all();
    }
}
