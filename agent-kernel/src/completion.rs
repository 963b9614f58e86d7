//! Completion loop: render, generate, and retry until the output has the expected shape.

use std::fmt;
use std::sync::Arc;

use agent_primitives::Content;
use agent_prompts::{PromptTemplate, extract_object, extract_object_array, extract_string_array};
use agent_telemetry::audit::{CompletionKind, CompletionLog, CompletionLogEntry};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::KernelResult;
use crate::backend::{Generation, GenerationBackend};
use crate::state::State;

/// Action name used when no acceptable response was produced.
pub const FALLBACK_ACTION: &str = "IGNORE";

/// Response chosen by the model, or the fallback after the attempt budget ran out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedResponse {
    /// Normalized reply.
    pub content: Content,
    /// `true` when `content` is the fallback rather than model output.
    pub fallback: bool,
}

impl GeneratedResponse {
    fn fallback() -> Self {
        Self {
            content: Content::text("").with_action(FALLBACK_ACTION),
            fallback: true,
        }
    }
}

/// Drives the generation backend with a fixed attempt budget.
///
/// Malformed output, a reply attributed to someone other than the agent, and
/// a deadline miss each consume one attempt. Once the budget is spent the
/// caller receives a fallback instead of an error. Transport failures are
/// returned immediately.
#[derive(Clone)]
pub struct CompletionLoop {
    backend: GenerationBackend,
    log: Arc<dyn CompletionLog>,
    attempts: usize,
    stop_sequences: Vec<String>,
}

impl fmt::Debug for CompletionLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionLoop")
            .field("backend", &self.backend)
            .field("attempts", &self.attempts)
            .field("stop_sequences", &self.stop_sequences)
            .finish_non_exhaustive()
    }
}

impl CompletionLoop {
    /// Creates a loop that tries at most `attempts` times (at least once).
    #[must_use]
    pub fn new(backend: GenerationBackend, log: Arc<dyn CompletionLog>, attempts: usize) -> Self {
        Self {
            backend,
            log,
            attempts: attempts.max(1),
            stop_sequences: Vec::new(),
        }
    }

    /// Sets stop sequences passed with every request.
    #[must_use]
    pub fn with_stop_sequences<I, S>(mut self, stops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_sequences = stops.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the attempt budget.
    #[must_use]
    pub const fn attempts(&self) -> usize {
        self.attempts
    }

    /// Substitutes the state's values into `template`. Unknown keys render empty.
    #[must_use]
    pub fn render(state: &State, template: &PromptTemplate) -> String {
        template.render(&state.template_values())
    }

    /// Calls the backend once.
    ///
    /// # Errors
    ///
    /// Propagates backend transport failures.
    pub async fn generate(&self, prompt: &str) -> KernelResult<Generation> {
        self.backend.complete(prompt, &self.stop_sequences).await
    }

    /// Generates until `accept` returns a value or the budget is spent.
    ///
    /// Every attempt is written to the audit log; a failed audit write only
    /// logs a warning. Returns `Ok(None)` when no attempt was accepted.
    ///
    /// # Errors
    ///
    /// Propagates backend transport failures.
    pub async fn generate_validated<T, F>(
        &self,
        kind: CompletionKind,
        request: Value,
        prompt: &str,
        mut accept: F,
    ) -> KernelResult<Option<T>>
    where
        F: FnMut(&str) -> Option<T> + Send,
        T: Send,
    {
        for attempt in 1..=self.attempts {
            let generation = self.generate(prompt).await?;
            let raw = match &generation {
                Generation::Text(text) => Some(text.clone()),
                Generation::TimedOut => None,
            };
            self.audit(kind, &request, attempt, prompt, raw).await;

            match generation {
                Generation::Text(text) => {
                    if let Some(value) = accept(&text) {
                        debug!(?kind, attempt, "completion accepted");
                        return Ok(Some(value));
                    }
                    warn!(?kind, attempt, budget = self.attempts, "completion rejected; retrying");
                }
                Generation::TimedOut => {
                    warn!(
                        ?kind,
                        attempt,
                        budget = self.attempts,
                        timeout = ?self.backend.timeout(),
                        "completion timed out; retrying"
                    );
                }
            }
        }
        warn!(?kind, budget = self.attempts, "completion budget exhausted");
        Ok(None)
    }

    /// Generates the agent's reply.
    ///
    /// The output must be a JSON object whose `user` field names the agent;
    /// its `content`/`text` and `action` fields become the reply. Falls back
    /// to an empty `IGNORE` reply when no attempt qualifies.
    ///
    /// # Errors
    ///
    /// Propagates backend transport failures.
    pub async fn generate_response(
        &self,
        state: &State,
        template: &PromptTemplate,
    ) -> KernelResult<GeneratedResponse> {
        let prompt = Self::render(state, template);
        let agent_name = state.agent_name().to_owned();
        let accepted = self
            .generate_validated(
                CompletionKind::Response,
                request_context(state),
                &prompt,
                |raw| parse_response(raw, &agent_name),
            )
            .await?;
        Ok(accepted.map_or_else(GeneratedResponse::fallback, |content| GeneratedResponse {
            content,
            fallback: false,
        }))
    }

    /// Generates an array of objects, each carrying every key in `required_keys`.
    /// Falls back to an empty list.
    ///
    /// # Errors
    ///
    /// Propagates backend transport failures.
    pub async fn generate_object_array(
        &self,
        state: &State,
        template: &PromptTemplate,
        required_keys: &[&str],
    ) -> KernelResult<Vec<Map<String, Value>>> {
        let prompt = Self::render(state, template);
        let accepted = self
            .generate_validated(
                CompletionKind::ObjectArray,
                request_context(state),
                &prompt,
                |raw| {
                    extract_object_array(raw).ok().filter(|items| {
                        items
                            .iter()
                            .all(|item| required_keys.iter().all(|key| item.contains_key(*key)))
                    })
                },
            )
            .await?;
        Ok(accepted.unwrap_or_default())
    }

    /// Generates a list of names. Falls back to an empty list.
    ///
    /// # Errors
    ///
    /// Propagates backend transport failures.
    pub async fn generate_name_list(
        &self,
        state: &State,
        template: &PromptTemplate,
    ) -> KernelResult<Vec<String>> {
        let prompt = Self::render(state, template);
        let accepted = self
            .generate_validated(
                CompletionKind::NameList,
                request_context(state),
                &prompt,
                |raw| extract_string_array(raw).ok(),
            )
            .await?;
        Ok(accepted.unwrap_or_default())
    }

    async fn audit(
        &self,
        kind: CompletionKind,
        request: &Value,
        attempt: usize,
        prompt: &str,
        raw: Option<String>,
    ) {
        let mut request = request.clone();
        if let Value::Object(map) = &mut request {
            map.insert("attempt".to_owned(), Value::from(attempt));
        }
        let entry = CompletionLogEntry::new(kind, request, prompt, raw);
        if let Err(err) = self.log.record(&entry).await {
            warn!(error = %err, "failed to write completion audit entry");
        }
    }
}

fn request_context(state: &State) -> Value {
    json!({
        "room_id": state.room_id(),
        "agent": state.agent.id(),
        "sender": state.sender.id(),
    })
}

/// Accepts a reply object only when its `user` field names the agent.
fn parse_response(raw: &str, agent_name: &str) -> Option<Content> {
    let map = extract_object(raw).ok()?;
    let speaker = map.get("user").and_then(Value::as_str).map(str::trim);
    if speaker != Some(agent_name) {
        debug!(?speaker, agent_name, "reply attributed to another speaker");
        return None;
    }
    Content::from_value(Value::Object(map)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_must_name_the_agent() {
        let raw = "```json\n{\"user\": \"Ada\", \"content\": \"hi\", \"action\": \"NONE\"}\n```";
        let content = parse_response(raw, "Ada").unwrap();
        assert_eq!(content.text, "hi");
        assert_eq!(content.action.as_deref(), Some("NONE"));

        assert!(parse_response(raw, "Bob").is_none());
        assert!(parse_response("{\"content\": \"hi\"}", "Ada").is_none());
        assert!(parse_response("hello there", "Ada").is_none());
    }

    #[test]
    fn fallback_is_an_empty_ignore() {
        let fallback = GeneratedResponse::fallback();
        assert!(fallback.fallback);
        assert!(fallback.content.text.is_empty());
        assert_eq!(fallback.content.action.as_deref(), Some(FALLBACK_ACTION));
    }
}
