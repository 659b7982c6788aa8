//! REST endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/status` | Current state document |
//! | `POST` | `/api/mode` | Switch between `realtime` and `scenario` |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use thunderbird_types::SystemMode;
use tracing::info;

use crate::error::GatewayError;
use crate::state::AppState;

/// Request body for `POST /api/mode`.
#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    /// Requested mode name.
    pub mode: String,
}

/// Response body for a successful mode change.
#[derive(Debug, Serialize)]
pub struct ModeResponse {
    /// Always `"success"`.
    pub status: &'static str,
    /// The mode now in effect.
    pub mode: SystemMode,
}

/// Return the current state document.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.supervisor.snapshot().await)
}

/// Switch the system mode.
///
/// Responds once the new regime is running and the mode change has been
/// committed for broadcast.
pub async fn set_mode(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ModeRequest>, JsonRejection>,
) -> Result<Json<ModeResponse>, GatewayError> {
    let Json(request) = body?;
    let mode: SystemMode = request.mode.parse()?;

    let snapshot = state.supervisor.switch_mode(mode).await?;
    info!(%mode, version = snapshot.version(), "mode change requested via API");

    Ok(Json(ModeResponse {
        status: "success",
        mode,
    }))
}
