//! Action and evaluator registries with concurrent validation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use agent_primitives::Message;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::runtime::AgentRuntime;
use crate::state::State;
use crate::{KernelError, KernelResult};

/// Metadata describing a registered action or evaluator.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandlerMetadata {
    name: String,
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    examples: Vec<String>,
}

impl HandlerMetadata {
    /// Creates metadata for the supplied name.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidMetadata`] if the name is blank or contains whitespace.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> KernelResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(KernelError::InvalidMetadata {
                reason: "handler name cannot be empty".into(),
            });
        }
        if name.chars().any(char::is_whitespace) {
            return Err(KernelError::InvalidMetadata {
                reason: format!("handler name `{name}` cannot contain whitespace"),
            });
        }
        Ok(Self {
            name,
            description: description.into(),
            condition: None,
            examples: Vec::new(),
        })
    }

    /// Metadata for built-in handlers whose names are known to be valid.
    pub(crate) fn builtin(name: &'static str, description: &'static str) -> Self {
        Self {
            name: name.to_owned(),
            description: description.to_owned(),
            condition: None,
            examples: Vec::new(),
        }
    }

    /// Sets the natural-language precondition shown to the model.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Adds an example exchange shown to the model.
    #[must_use]
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    /// Returns the handler name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the precondition, if any.
    #[must_use]
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// Returns the examples.
    #[must_use]
    pub fn examples(&self) -> &[String] {
        &self.examples
    }
}

/// Common surface of actions and evaluators.
pub trait Handler: Send + Sync {
    /// Returns the metadata describing this handler.
    fn metadata(&self) -> &HandlerMetadata;

    /// Returns the handler name.
    fn name(&self) -> &str {
        self.metadata().name()
    }
}

/// Something the agent can do in response to a message.
#[async_trait]
pub trait Action: Handler {
    /// Returns `true` when the action applies to `message`.
    async fn validate(&self, runtime: &AgentRuntime, message: &Message) -> KernelResult<bool>;

    /// Runs the action.
    async fn handle(
        &self,
        runtime: &AgentRuntime,
        message: &Message,
        state: &State,
    ) -> KernelResult<Option<Value>>;
}

/// Post-response step that derives durable knowledge.
#[async_trait]
pub trait Evaluator: Handler {
    /// Returns `true` when the evaluator could apply given the composed state.
    async fn validate(
        &self,
        runtime: &AgentRuntime,
        message: &Message,
        state: &State,
    ) -> KernelResult<bool>;

    /// Runs the evaluator.
    async fn handle(
        &self,
        runtime: &AgentRuntime,
        message: &Message,
        state: &State,
    ) -> KernelResult<Option<Value>>;
}

/// Ordered, append-only set of uniquely named handlers.
pub struct Registry<T: ?Sized + Handler> {
    kind: &'static str,
    entries: Vec<Arc<T>>,
    index: HashMap<String, usize>,
}

impl<T: ?Sized + Handler> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("registered", &self.names())
            .finish()
    }
}

impl<T: ?Sized + Handler> Registry<T> {
    fn with_kind(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Appends a handler.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::DuplicateRegistration`] when the name is taken.
    pub fn register(&mut self, entry: Arc<T>) -> KernelResult<()> {
        let name = entry.name().to_owned();
        if self.index.contains_key(&name) {
            return Err(KernelError::DuplicateRegistration {
                kind: self.kind,
                name,
            });
        }
        self.index.insert(name, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Looks up a handler by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.index
            .get(name)
            .map(|&position| Arc::clone(&self.entries[position]))
    }

    /// Returns the registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name()).collect()
    }

    /// Returns the handlers in registration order.
    #[must_use]
    pub fn entries(&self) -> &[Arc<T>] {
        &self.entries
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Registry<dyn Action> {
    fn default() -> Self {
        Self::with_kind("action")
    }
}

impl Default for Registry<dyn Evaluator> {
    fn default() -> Self {
        Self::with_kind("evaluator")
    }
}

impl Registry<dyn Action> {
    /// Validates every action against the raw message concurrently and
    /// returns those that apply, in registration order.
    pub async fn validate_actions(
        &self,
        runtime: &AgentRuntime,
        message: &Message,
    ) -> Vec<Arc<dyn Action>> {
        fan_out(self.kind, &self.entries, |action| async move {
            action.validate(runtime, message).await
        })
        .await
    }
}

impl Registry<dyn Evaluator> {
    /// Validates every evaluator against the composed state concurrently and
    /// returns those that apply, in registration order.
    pub async fn validate_evaluators(
        &self,
        runtime: &AgentRuntime,
        message: &Message,
        state: &State,
    ) -> Vec<Arc<dyn Evaluator>> {
        fan_out(self.kind, &self.entries, |evaluator| async move {
            evaluator.validate(runtime, message, state).await
        })
        .await
    }
}

/// Runs `check` for every entry at once. Errors and panics count as "does not apply".
async fn fan_out<T, F, Fut>(kind: &'static str, entries: &[Arc<T>], check: F) -> Vec<Arc<T>>
where
    T: ?Sized + Handler,
    F: Fn(Arc<T>) -> Fut,
    Fut: Future<Output = KernelResult<bool>>,
{
    let checks = entries
        .iter()
        .map(|entry| AssertUnwindSafe(check(Arc::clone(entry))).catch_unwind());
    let results = join_all(checks).await;

    entries
        .iter()
        .zip(results)
        .filter_map(|(entry, result)| match result {
            Ok(Ok(true)) => Some(Arc::clone(entry)),
            Ok(Ok(false)) => None,
            Ok(Err(err)) => {
                warn!(kind, name = entry.name(), error = %err, "validation failed; skipping");
                None
            }
            Err(_) => {
                warn!(kind, name = entry.name(), "validation panicked; skipping");
                None
            }
        })
        .collect()
}
