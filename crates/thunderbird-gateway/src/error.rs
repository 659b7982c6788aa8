//! Error types for the gateway.
//!
//! [`GatewayError`] converts into an Axum response with a JSON body of
//! the form `{"error": <message>, "status": <code>}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thunderbird_core::store::StoreError;
use thunderbird_types::ParseModeError;

/// Errors that can occur while handling a gateway request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The body was missing, not JSON, or lacked a string `mode`.
    #[error("Invalid request body")]
    InvalidBody(#[from] JsonRejection),

    /// `mode` was a string but not a known mode.
    #[error("Invalid mode. Must be 'realtime' or 'scenario'")]
    InvalidMode(#[from] ParseModeError),

    /// The broadcaster is shutting down.
    #[error("broadcaster unavailable: {0}")]
    Unavailable(#[from] StoreError),
}

impl GatewayError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) | Self::InvalidMode(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
