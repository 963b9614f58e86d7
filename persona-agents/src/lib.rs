//! Persona agent runtime SDK facade.
//!
//! Depend on this crate via `cargo add persona-agents`. It bundles the runtime
//! crates behind feature flags; the `kernel` feature pulls in everything the
//! turn pipeline needs.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use agent_primitives as primitives;

/// Turn-processing runtime (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use agent_kernel as kernel;

/// Model and embedding adapters (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use agent_adapters as adapters;

/// Memory domains and stores (enabled by `memory` feature).
#[cfg(feature = "memory")]
pub use agent_memory as memory;

/// Tracing bootstrap and completion audit (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;

/// Prompt rendering and structured-output parsing (enabled by `prompts` feature).
#[cfg(feature = "prompts")]
pub use agent_prompts as prompts;

/// Runtime configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use agent_config as config;

/// Items most agents need, for a single glob import.
#[cfg(feature = "kernel")]
pub mod prelude {
    pub use agent_config::RuntimeConfig;
    pub use agent_kernel::{
        Action, AgentRuntime, AgentRuntimeBuilder, Evaluator, Goal, GoalStatus, HandlerMetadata,
        KernelError, KernelResult, Objective, Provider, State, TurnOutcome,
    };
    pub use agent_primitives::{Actor, ActorId, Content, Message, RoomId};
}
