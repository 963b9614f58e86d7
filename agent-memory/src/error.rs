//! Error types for the memory subsystem.

use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted by memory components.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
    /// A manager was built without a store.
    #[error("memory store not configured")]
    MissingStore,
    /// A manager was built without an embedder.
    #[error("embedder not configured")]
    MissingEmbedder,
    /// Persistence backend reported a failure.
    #[error("memory backend error: {reason}")]
    Backend {
        /// Human-readable reason describing the failure.
        reason: String,
    },
    /// The embedding collaborator failed.
    #[error("embedding failed: {reason}")]
    Embedding {
        /// Human-readable reason describing the failure.
        reason: String,
    },
    /// Attempted to embed a record without any text.
    #[error("cannot embed empty content")]
    EmptyContent,
    /// Memory record failed validation.
    #[error("invalid memory record: {0}")]
    InvalidRecord(&'static str),
}

impl MemoryError {
    /// Helper to construct backend errors from string-like values.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }

    /// Helper to construct embedding errors from string-like values.
    #[must_use]
    pub fn embedding(reason: impl Into<String>) -> Self {
        Self::Embedding {
            reason: reason.into(),
        }
    }
}

/// Result type alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
