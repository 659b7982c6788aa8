//! Axum router construction for the gateway.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /ws` -- `WebSocket` state subscription
/// - `GET /api/status` -- current state document
/// - `POST /api/mode` -- mode change command
///
/// Other methods on these paths get `405`. CORS allows any origin,
/// method and header.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::ws_state))
        .route("/api/status", get(handlers::get_status))
        .route("/api/mode", post(handlers::set_mode))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
