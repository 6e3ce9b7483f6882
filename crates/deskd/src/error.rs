//! Lifecycle controller error types.

use thiserror::Error;

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors that can occur while managing desktop lifecycles.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Bad or missing configuration. Fatal to the current pass only.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Telemetry invocation never reached a terminal status within the
    /// poll budget. Affected sessions are skipped this pass.
    #[error("telemetry invocation {invocation_id} not terminal after {attempts} poll attempts")]
    CollectorTimeout {
        invocation_id: String,
        attempts: u32,
    },

    /// Telemetry invocation reached a terminal failed status.
    #[error("telemetry invocation {invocation_id} failed: {message}")]
    CollectorFailure {
        invocation_id: String,
        message: String,
    },

    /// A fleet control-plane call failed.
    #[error("fleet action failed: {0}")]
    FleetAction(String),

    /// A remote command dispatch or lookup failed.
    #[error("remote command failed: {0}")]
    RemoteCommand(String),

    /// A session store read or write failed.
    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Telemetry output could not be parsed.
    #[error("invalid telemetry payload: {0}")]
    Parse(String),
}
