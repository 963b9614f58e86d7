//! Built-in actions.

use agent_primitives::Message;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::KernelResult;
use crate::registry::{Action, Handler, HandlerMetadata};
use crate::runtime::AgentRuntime;
use crate::state::State;

/// Consecutive `CONTINUE` replies allowed before the action stops validating.
pub const MAX_CONTINUATIONS: usize = 3;

/// Ends the exchange without further output.
#[derive(Debug, Clone)]
pub struct IgnoreAction {
    metadata: HandlerMetadata,
}

impl Default for IgnoreAction {
    fn default() -> Self {
        Self {
            metadata: HandlerMetadata::builtin(
                "IGNORE",
                "Stop responding. Use when the conversation is over or the message needs no reply.",
            )
            .with_condition("the other participant said goodbye or is being hostile"),
        }
    }
}

impl Handler for IgnoreAction {
    fn metadata(&self) -> &HandlerMetadata {
        &self.metadata
    }
}

#[async_trait]
impl Action for IgnoreAction {
    async fn validate(&self, _runtime: &AgentRuntime, _message: &Message) -> KernelResult<bool> {
        Ok(true)
    }

    async fn handle(
        &self,
        _runtime: &AgentRuntime,
        _message: &Message,
        _state: &State,
    ) -> KernelResult<Option<Value>> {
        Ok(None)
    }
}

/// Plain reply with no side effect.
#[derive(Debug, Clone)]
pub struct NoneAction {
    metadata: HandlerMetadata,
}

impl Default for NoneAction {
    fn default() -> Self {
        Self {
            metadata: HandlerMetadata::builtin(
                "NONE",
                "Respond with the message text only and take no further action.",
            ),
        }
    }
}

impl Handler for NoneAction {
    fn metadata(&self) -> &HandlerMetadata {
        &self.metadata
    }
}

#[async_trait]
impl Action for NoneAction {
    async fn validate(&self, _runtime: &AgentRuntime, _message: &Message) -> KernelResult<bool> {
        Ok(true)
    }

    async fn handle(
        &self,
        _runtime: &AgentRuntime,
        _message: &Message,
        _state: &State,
    ) -> KernelResult<Option<Value>> {
        Ok(None)
    }
}

/// Sends one follow-up message after the reply.
///
/// The follow-up is stored as a dialogue memory; its own action is not run.
#[derive(Debug, Clone)]
pub struct ContinueAction {
    metadata: HandlerMetadata,
}

impl Default for ContinueAction {
    fn default() -> Self {
        Self {
            metadata: HandlerMetadata::builtin(
                "CONTINUE",
                "Keep talking after this message, for thoughts that need more than one message.",
            )
            .with_condition("the reply is part of a longer thought"),
        }
    }
}

impl Handler for ContinueAction {
    fn metadata(&self) -> &HandlerMetadata {
        &self.metadata
    }
}

#[async_trait]
impl Action for ContinueAction {
    async fn validate(&self, runtime: &AgentRuntime, message: &Message) -> KernelResult<bool> {
        // Other speakers' lines sit between the agent's replies, so look past
        // them at the agent's own newest replies.
        let window = runtime
            .config()
            .recent_message_count
            .max(MAX_CONTINUATIONS * 2);
        let recent = runtime
            .messages()
            .get_recent(&message.participants(), window, false)
            .await?;
        let agent = runtime.agent().id();
        let continuing = recent
            .iter()
            .filter(|record| record.author() == Some(agent))
            .take(MAX_CONTINUATIONS)
            .take_while(|record| record.content().action.as_deref() == Some(self.name()))
            .count();
        Ok(continuing < MAX_CONTINUATIONS)
    }

    async fn handle(
        &self,
        runtime: &AgentRuntime,
        message: &Message,
        state: &State,
    ) -> KernelResult<Option<Value>> {
        let followup = runtime
            .completion()
            .generate_response(state, &runtime.templates().continue_message)
            .await?;
        if followup.fallback {
            debug!(room_id = %message.room_id, "no usable follow-up; stopping");
            return Ok(None);
        }
        runtime
            .store_agent_message(message, &followup.content)
            .await?;
        Ok(Some(json!({
            "text": followup.content.text,
            "action": followup.content.action,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_stable() {
        assert_eq!(IgnoreAction::default().name(), "IGNORE");
        assert_eq!(NoneAction::default().name(), "NONE");
        assert_eq!(ContinueAction::default().name(), "CONTINUE");
        assert!(IgnoreAction::default().metadata().condition().is_some());
    }
}
