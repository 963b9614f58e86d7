//! Core shared types for persona agents.

#![warn(missing_docs, clippy::pedantic)]

mod actor;
mod content;
mod error;
mod ids;

/// Participants resolved from account records.
pub use actor::{Actor, ActorDetails};
/// Normalized message content and inbound messages.
pub use content::{Content, Message};
/// Error type and result alias shared across the SDK.
pub use error::{Error, Result};
/// Strongly typed identifiers.
pub use ids::{ActorId, GoalId, MemoryId, ObjectiveId, RoomId};
