//! Shared error definitions for agent primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the agent runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating agent primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided identifier could not be parsed.
    #[error("invalid identifier: {source}")]
    InvalidId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Message content could not be normalized.
    #[error("invalid content: {reason}")]
    InvalidContent {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Actor definition failed validation.
    #[error("invalid actor: {reason}")]
    InvalidActor {
        /// Human-readable reason for rejection.
        reason: String,
    },
}
