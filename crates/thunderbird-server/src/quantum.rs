//! Bootstrap of the external quantum key module.
//!
//! The module is a separate program (by default
//! `python ./quantum/init_qiskit.py`). It is run once at startup in the
//! background with `QUANTUM_URL` set to the configured service URL. The
//! broadcaster does not depend on it, so a failure is only logged.

use std::process::Stdio;

use thunderbird_core::config::QuantumConfig;
use tokio::process::Command;
use tracing::{info, warn};

/// Why the quantum module could not be initialized.
#[derive(Debug, thiserror::Error)]
pub enum QuantumInitError {
    /// The init program could not be launched.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        /// Program that was launched.
        program: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The init program ran but reported failure.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        /// Program that was launched.
        program: String,
        /// Exit status as reported by the OS.
        status: std::process::ExitStatus,
        /// Trimmed standard error output.
        stderr: String,
    },
}

/// Run the configured init program to completion.
///
/// # Errors
///
/// Returns [`QuantumInitError`] if the program cannot be launched or
/// exits unsuccessfully.
pub async fn initialize(config: &QuantumConfig) -> Result<(), QuantumInitError> {
    let output = Command::new(&config.init_program)
        .args(&config.init_args)
        .env("QUANTUM_URL", &config.service_url)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| QuantumInitError::Spawn {
            program: config.init_program.clone(),
            source,
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(QuantumInitError::Failed {
            program: config.init_program.clone(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

/// Initialize the quantum module on a background task, logging the
/// outcome. Does nothing when disabled.
pub fn spawn_initialization(config: QuantumConfig) {
    if !config.enabled {
        info!("quantum module bootstrap disabled");
        return;
    }

    tokio::spawn(async move {
        info!(program = %config.init_program, url = %config.service_url, "initializing quantum module");
        match initialize(&config).await {
            Ok(()) => info!("quantum module initialized"),
            Err(e) => warn!(error = %e, "quantum module initialization failed, continuing without it"),
        }
    });
}

#[cfg(all(test, unix))]
mod tests {
    #![allow(clippy::panic)]

    use super::*;

    fn config(program: &str, args: &[&str]) -> QuantumConfig {
        QuantumConfig {
            service_url: String::from("http://localhost:8081"),
            enabled: true,
            init_program: program.to_owned(),
            init_args: args.iter().map(|a| (*a).to_owned()).collect(),
        }
    }

    #[tokio::test]
    async fn successful_program_initializes() {
        let check_env = config("sh", &["-c", "test \"$QUANTUM_URL\" = http://localhost:8081"]);
        let result = initialize(&check_env).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn failing_program_reports_stderr() {
        let result = initialize(&config("sh", &["-c", "echo qiskit missing >&2; exit 3"])).await;
        match result {
            Err(QuantumInitError::Failed { stderr, status, .. }) => {
                assert_eq!(stderr, "qiskit missing");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let result = initialize(&config("/nonexistent/thunderbird-quantum-init", &[])).await;
        assert!(matches!(result, Err(QuantumInitError::Spawn { .. })));
    }
}
