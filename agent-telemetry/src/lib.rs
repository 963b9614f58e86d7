//! Observability utilities for persona agents.
//!
//! [`tracing_support`] installs the process-wide subscriber; [`audit`] keeps a
//! side-channel record of every completion request sent to the model.

#![warn(missing_docs, clippy::pedantic)]

pub mod audit;
pub mod error;
pub mod tracing_support;

pub use audit::{
    CollectingCompletionLog, CompletionKind, CompletionLog, CompletionLogEntry,
    FileCompletionLog, TracingCompletionLog,
};
pub use error::{TelemetryError, TelemetryResult};
