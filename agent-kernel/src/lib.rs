//! Turn-processing kernel for persona agents.
//!
//! An [`AgentRuntime`] answers one inbound message per turn:
//!
//! 1. the message is stored and a [`State`] is composed from every memory
//!    domain, goals, lore, and provider text, while registered actions
//!    validate concurrently;
//! 2. the [`CompletionLoop`] renders the reply prompt and retries until the
//!    model produces a reply attributed to the agent, or falls back to `IGNORE`;
//! 3. the reply is stored, the action it names runs, and the model picks
//!    which validated evaluators fire.
//!
//! Turns for different rooms can run side by side through
//! [`AgentRuntime::schedule_message`].

#![warn(missing_docs, clippy::pedantic)]

pub mod accounts;
pub mod actions;
pub mod backend;
pub mod completion;
mod composer;
mod dispatch;
mod error;
pub mod evaluators;
pub mod format;
pub mod goals;
pub mod providers;
pub mod registry;
pub mod relationships;
pub mod runtime;
pub mod scheduler;
pub mod state;
pub mod templates;
pub mod testing;

pub use accounts::{AccountResolver, LocalAccountResolver};
pub use actions::{ContinueAction, IgnoreAction, NoneAction};
pub use backend::{AdapterEmbedder, Generation, GenerationBackend};
pub use completion::{CompletionLoop, FALLBACK_ACTION, GeneratedResponse};
pub use error::{KernelError, KernelResult};
pub use evaluators::{FactEvaluator, GoalEvaluator};
pub use goals::{Goal, GoalStatus, GoalStore, LocalGoalStore, Objective};
pub use providers::{Provider, TimeProvider};
pub use registry::{Action, Evaluator, Handler, HandlerMetadata, Registry};
pub use relationships::{ActorPair, LocalRelationshipStore, Relationship, RelationshipStore};
pub use runtime::{AgentRuntime, AgentRuntimeBuilder, TurnHandle, TurnOutcome};
pub use scheduler::{SchedulerConfig, SchedulerError, SchedulerResult, TurnScheduler};
pub use state::{DomainMemories, State};
pub use templates::Templates;
