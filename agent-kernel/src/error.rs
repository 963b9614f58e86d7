//! Error types for the agent kernel.

use std::time::Duration;

use agent_adapters::traits::AdapterError;
use agent_config::ConfigError;
use agent_memory::MemoryError;
use agent_primitives::{ActorId, GoalId, ObjectiveId};
use thiserror::Error;

use crate::goals::GoalStatus;
use crate::scheduler::SchedulerError;

/// Errors surfaced by the runtime. Any of these abandons the current turn.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A memory store or the embedder failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// The generation backend failed at the transport level.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    /// The runtime configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The turn scheduler refused work.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// Invalid primitive value.
    #[error(transparent)]
    Primitive(#[from] agent_primitives::Error),
    /// A backend call exceeded its deadline where no retry applies.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Deadline that elapsed.
        after: Duration,
    },
    /// An action or evaluator handler failed.
    #[error("handler `{name}` failed: {reason}")]
    Handler {
        /// Handler name.
        name: String,
        /// Human-readable reason.
        reason: String,
    },
    /// Handler metadata failed validation.
    #[error("invalid handler metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason.
        reason: String,
    },
    /// A handler with the same name is already registered.
    #[error("{kind} `{name}` is already registered")]
    DuplicateRegistration {
        /// Registry kind ("action" or "evaluator").
        kind: &'static str,
        /// Conflicting name.
        name: String,
    },
    /// The runtime builder is missing a collaborator.
    #[error("runtime is missing a {0}")]
    MissingComponent(&'static str),
    /// The message was addressed to a different agent.
    #[error("message addressed to {addressed}, runtime serves {agent}")]
    Misaddressed {
        /// Agent this runtime serves.
        agent: ActorId,
        /// Agent named on the message.
        addressed: ActorId,
    },
    /// An actor required for composition could not be resolved.
    #[error("actor {0} could not be resolved")]
    UnknownActor(ActorId),
    /// Goal does not exist.
    #[error("goal {0} not found")]
    GoalNotFound(GoalId),
    /// Objective does not exist within the goal.
    #[error("objective {objective} not found in goal {goal}")]
    ObjectiveNotFound {
        /// Goal searched.
        goal: GoalId,
        /// Missing objective.
        objective: ObjectiveId,
    },
    /// Goals only move from in-progress to a terminal status.
    #[error("goal {goal} cannot move from {from} to {to}")]
    InvalidGoalTransition {
        /// Goal concerned.
        goal: GoalId,
        /// Current status.
        from: GoalStatus,
        /// Requested status.
        to: GoalStatus,
    },
    /// Invalid goal definition.
    #[error("invalid goal: {reason}")]
    InvalidGoal {
        /// Human-readable reason.
        reason: String,
    },
    /// Relationships pair two distinct actors.
    #[error("actor {0} cannot be related to itself")]
    SelfRelationship(ActorId),
    /// A scheduled turn panicked or was cancelled before finishing.
    #[error("turn did not complete: {reason}")]
    TurnAborted {
        /// Human-readable reason.
        reason: String,
    },
    /// A collaborator backend (accounts, goals, relationships) failed.
    #[error("backend error: {reason}")]
    Backend {
        /// Human-readable reason.
        reason: String,
    },
}

impl KernelError {
    /// Creates a handler error from string-like values.
    #[must_use]
    pub fn handler(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handler {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a backend error from a string-like value.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Result alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
