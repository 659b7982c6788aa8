//! Error types for the broadcaster binary.

/// Top-level error for the broadcaster binary.
///
/// Only startup can fail; once serving, every failure is handled where it
/// happens.
#[derive(Debug, thiserror::Error)]
pub enum ServerMainError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: thunderbird_core::config::ConfigError,
    },

    /// The gateway could not be started.
    #[error("gateway error: {source}")]
    Gateway {
        /// The underlying server error.
        #[from]
        source: thunderbird_gateway::ServerError,
    },
}
