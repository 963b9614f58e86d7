//! Dispatch loop: runs the chosen action, then the evaluators the model selects.

use agent_primitives::{Content, Message};
use serde_json::Value;
use tracing::{debug, warn};

use crate::KernelResult;
use crate::runtime::AgentRuntime;
use crate::state::State;

impl AgentRuntime {
    /// Runs the action named in `reply`.
    ///
    /// Returns `Ok(None)` when the reply names no action, names one that is
    /// not registered, or names one that did not validate for this message.
    /// The last two are logged and skipped.
    ///
    /// # Errors
    ///
    /// Propagates the handler's error.
    pub async fn process_actions(
        &self,
        message: &Message,
        reply: &Content,
        state: &State,
    ) -> KernelResult<Option<Value>> {
        let Some(name) = reply.action.as_deref() else {
            return Ok(None);
        };
        let Some(action) = self.actions().get(name) else {
            warn!(action = name, "reply named an unregistered action; skipping");
            return Ok(None);
        };
        if !state.has_action(name) {
            warn!(action = name, "reply named an action that did not validate; skipping");
            return Ok(None);
        }
        debug!(action = name, room_id = %message.room_id, "running action");
        action.handle(self, message, state).await
    }

    /// Asks the model which validated evaluators apply to this turn and runs
    /// those it names, in registration order. Returns the names that ran.
    ///
    /// No completion is requested when nothing validated.
    ///
    /// # Errors
    ///
    /// Propagates backend transport failures and evaluator handler errors.
    pub async fn evaluate(&self, message: &Message, state: &State) -> KernelResult<Vec<String>> {
        if state.evaluators.is_empty() {
            debug!(room_id = %message.room_id, "no evaluators validated; skipping selection");
            return Ok(Vec::new());
        }

        let selected = self
            .completion()
            .generate_name_list(state, &self.templates().evaluator_selection)
            .await?;

        let mut ran = Vec::new();
        for evaluator in &state.evaluators {
            let name = evaluator.name();
            if !selected.iter().any(|chosen| chosen == name) {
                continue;
            }
            debug!(evaluator = name, room_id = %message.room_id, "running evaluator");
            evaluator.handle(self, message, state).await?;
            ran.push(name.to_owned());
        }

        for unknown in selected
            .iter()
            .filter(|chosen| !ran.iter().any(|name| name == *chosen))
        {
            debug!(evaluator = %unknown, "selection named an evaluator that did not validate");
        }
        Ok(ran)
    }
}
