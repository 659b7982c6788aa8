//! Gateway for the ThunderBird state broadcaster.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`) pushing the full state document on
//!   connect and again after every committed change
//! - **State document** (`GET /api/status`)
//! - **Mode command** (`POST /api/mode`) switching between the
//!   `realtime` and `scenario` regimes
//!
//! # Architecture
//!
//! The gateway owns no state of its own. Reads go to the supervisor's
//! store, mode changes go through the supervisor, and each `WebSocket`
//! connection is one subscriber of the [`BroadcastHub`] with its own
//! bounded queue.
//!
//! [`BroadcastHub`]: thunderbird_core::hub::BroadcastHub

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError};
pub use startup::{RunningGateway, spawn_gateway};
pub use state::AppState;
