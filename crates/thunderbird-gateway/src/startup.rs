//! Gateway startup helper for the broadcaster binary.
//!
//! [`spawn_gateway`] binds eagerly, so the caller learns about an
//! unusable address immediately, then serves on a background task.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// A gateway running on a background task.
#[derive(Debug)]
pub struct RunningGateway {
    /// The bound address (useful when port `0` was requested).
    pub addr: SocketAddr,
    /// The serving task; completes after `shutdown` resolves and open
    /// connections drain.
    pub handle: JoinHandle<()>,
}

/// Bind `config` and serve the gateway in the background until
/// `shutdown` resolves.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the listener cannot be bound.
pub async fn spawn_gateway<F>(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<RunningGateway, ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = server::bind(config).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("no local address: {e}")))?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, shutdown).await {
            error!(error = %e, "gateway exited with error");
        }
    });

    info!(%addr, "gateway listening");
    Ok(RunningGateway { addr, handle })
}
