//! Error types for telemetry components.

use thiserror::Error;

/// Errors emitted by telemetry sinks and bootstrap helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Filesystem failure while writing or reading an audit log.
    #[error("audit log I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[from]
        source: std::io::Error,
    },
    /// An entry could not be encoded or decoded.
    #[error("audit log serialization error: {source}")]
    Serialization {
        /// Underlying serde error.
        #[from]
        source: serde_json::Error,
    },
    /// A global subscriber is already installed or the filter is invalid.
    #[error("tracing subscriber initialisation failed: {reason}")]
    Subscriber {
        /// Human-readable reason.
        reason: String,
    },
}

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
