//! Deterministic test doubles for runtimes, adapters, and handlers.

use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use agent_adapters::traits::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, InferenceChunk, InferenceRequest,
    ModelAdapter,
};
use agent_memory::{Embedder, EmbeddingVector, MemoryResult};
use agent_primitives::Message;
use agent_telemetry::audit::{CompletionLog, CompletionLogEntry};
use agent_telemetry::{TelemetryError, TelemetryResult};
use async_trait::async_trait;
use futures::stream;
use serde_json::Value;

use crate::providers::Provider;
use crate::registry::{Action, Evaluator, Handler, HandlerMetadata};
use crate::runtime::AgentRuntime;
use crate::state::State;
use crate::{KernelError, KernelResult};

/// Dimensionality of [`HashEmbedder`] vectors.
pub const HASH_EMBEDDING_DIMENSIONS: usize = 256;

/// One scripted model response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Streams the text in two chunks.
    Text(String),
    /// Fails with [`AdapterError::Transport`].
    TransportError,
    /// Never produces a chunk.
    Stall,
}

impl ScriptedReply {
    /// Convenience constructor for [`ScriptedReply::Text`].
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Model adapter that replays a script and records every prompt.
///
/// Once the script runs out the adapter keeps answering with the fallback
/// reply if one was set, or fails with a transport error otherwise.
#[derive(Debug)]
pub struct ScriptedAdapter {
    metadata: AdapterMetadata,
    script: Mutex<VecDeque<ScriptedReply>>,
    fallback: Option<ScriptedReply>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    /// Creates an adapter that answers with `replies` in order.
    #[must_use]
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = ScriptedReply>,
    {
        Self {
            metadata: AdapterMetadata::new("scripted", "script"),
            script: Mutex::new(replies.into_iter().collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Creates an adapter that gives the same answer forever.
    #[must_use]
    pub fn always(reply: ScriptedReply) -> Self {
        Self::new([]).with_fallback(reply)
    }

    /// Sets the reply used once the script is exhausted.
    #[must_use]
    pub fn with_fallback(mut self, reply: ScriptedReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Appends a reply to the script.
    ///
    /// # Panics
    ///
    /// Panics if the script mutex was poisoned by a previous panic.
    pub fn push(&self, reply: ScriptedReply) {
        self.script
            .lock()
            .expect("scripted adapter poisoned")
            .push_back(reply);
    }

    /// Number of `infer` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the prompt mutex was poisoned by a previous panic.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .expect("scripted adapter poisoned")
            .clone()
    }

    fn next_reply(&self) -> Option<ScriptedReply> {
        self.script
            .lock()
            .expect("scripted adapter poisoned")
            .pop_front()
            .or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl ModelAdapter for ScriptedAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request
            .messages()
            .iter()
            .map(|message| message.content())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts
            .lock()
            .expect("scripted adapter poisoned")
            .push(prompt);

        match self.next_reply() {
            Some(ScriptedReply::Text(text)) => {
                let split = text
                    .char_indices()
                    .nth(text.chars().count() / 2)
                    .map_or(text.len(), |(index, _)| index);
                let (head, tail) = text.split_at(split);
                let chunks: Vec<AdapterResult<InferenceChunk>> = vec![
                    Ok(InferenceChunk::new(head, false)),
                    Ok(InferenceChunk::new(tail, true)),
                ];
                Ok(Box::pin(stream::iter(chunks)))
            }
            Some(ScriptedReply::Stall) => {
                Ok(Box::pin(stream::pending::<AdapterResult<InferenceChunk>>()))
            }
            Some(ScriptedReply::TransportError) => {
                Err(AdapterError::transport("scripted transport failure"))
            }
            None => Err(AdapterError::transport("script exhausted")),
        }
    }
}

/// Bag-of-words embedder: each lowercase word hashes into one of
/// [`HASH_EMBEDDING_DIMENSIONS`] buckets. Identical texts embed identically
/// and texts sharing no words score zero.
#[derive(Debug, Default)]
pub struct HashEmbedder {
    calls: AtomicUsize,
}

impl HashEmbedder {
    /// Creates an embedder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `embed` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> MemoryResult<EmbeddingVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut values = vec![0.0_f32; HASH_EMBEDDING_DIMENSIONS];
        for word in text
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hasher.finish() % HASH_EMBEDDING_DIMENSIONS as u64) as usize;
            values[bucket] += 1.0;
        }
        EmbeddingVector::new(values)
    }
}

/// How a recording handler answers `validate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidateBehavior {
    /// Returns `Ok(true)`.
    Accept,
    /// Returns `Ok(false)`.
    Reject,
    /// Returns an error.
    Fail,
    /// Panics.
    Panic,
}

impl ValidateBehavior {
    fn apply(self, name: &str) -> KernelResult<bool> {
        match self {
            Self::Accept => Ok(true),
            Self::Reject => Ok(false),
            Self::Fail => Err(KernelError::handler(name, "scripted validation failure")),
            Self::Panic => panic!("scripted validation panic in {name}"),
        }
    }
}

/// What a recording handler saw when it ran.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandledCall {
    /// Text of the message being answered.
    pub message_text: String,
    /// Dialogue window texts at the time of the call, newest first.
    pub recent_messages: Vec<String>,
}

#[derive(Debug)]
struct Recorder {
    metadata: HandlerMetadata,
    behavior: ValidateBehavior,
    output: Option<Value>,
    validations: AtomicUsize,
    handled: Mutex<Vec<HandledCall>>,
}

impl Recorder {
    fn new(name: &str, behavior: ValidateBehavior) -> KernelResult<Self> {
        Ok(Self {
            metadata: HandlerMetadata::new(name, format!("Recording handler {name}"))?,
            behavior,
            output: None,
            validations: AtomicUsize::new(0),
            handled: Mutex::new(Vec::new()),
        })
    }

    fn validate(&self) -> KernelResult<bool> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        self.behavior.apply(self.metadata.name())
    }

    fn handle(&self, message: &Message, state: &State) -> Option<Value> {
        let call = HandledCall {
            message_text: message.content.text.clone(),
            recent_messages: state
                .recent_messages
                .iter()
                .map(|record| record.content().text.clone())
                .collect(),
        };
        self.handled
            .lock()
            .expect("recording handler poisoned")
            .push(call);
        self.output.clone()
    }

    fn calls(&self) -> Vec<HandledCall> {
        self.handled
            .lock()
            .expect("recording handler poisoned")
            .clone()
    }
}

/// Action that records every call and validates as scripted.
#[derive(Debug)]
pub struct RecordingAction {
    recorder: Recorder,
}

impl RecordingAction {
    /// Creates an action named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidMetadata`] for an invalid name.
    pub fn new(name: &str, behavior: ValidateBehavior) -> KernelResult<Self> {
        Ok(Self {
            recorder: Recorder::new(name, behavior)?,
        })
    }

    /// Sets the value returned from `handle`.
    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.recorder.output = Some(output);
        self
    }

    /// Number of `validate` calls so far.
    #[must_use]
    pub fn validations(&self) -> usize {
        self.recorder.validations.load(Ordering::SeqCst)
    }

    /// Calls to `handle` so far.
    ///
    /// # Panics
    ///
    /// Panics if the call log mutex was poisoned by a previous panic.
    #[must_use]
    pub fn calls(&self) -> Vec<HandledCall> {
        self.recorder.calls()
    }
}

impl Handler for RecordingAction {
    fn metadata(&self) -> &HandlerMetadata {
        &self.recorder.metadata
    }
}

#[async_trait]
impl Action for RecordingAction {
    async fn validate(&self, _runtime: &AgentRuntime, _message: &Message) -> KernelResult<bool> {
        self.recorder.validate()
    }

    async fn handle(
        &self,
        _runtime: &AgentRuntime,
        message: &Message,
        state: &State,
    ) -> KernelResult<Option<Value>> {
        Ok(self.recorder.handle(message, state))
    }
}

/// Evaluator that records every call and validates as scripted.
#[derive(Debug)]
pub struct RecordingEvaluator {
    recorder: Recorder,
}

impl RecordingEvaluator {
    /// Creates an evaluator named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidMetadata`] for an invalid name.
    pub fn new(name: &str, behavior: ValidateBehavior) -> KernelResult<Self> {
        Ok(Self {
            recorder: Recorder::new(name, behavior)?,
        })
    }

    /// Number of `validate` calls so far.
    #[must_use]
    pub fn validations(&self) -> usize {
        self.recorder.validations.load(Ordering::SeqCst)
    }

    /// Calls to `handle` so far.
    ///
    /// # Panics
    ///
    /// Panics if the call log mutex was poisoned by a previous panic.
    #[must_use]
    pub fn calls(&self) -> Vec<HandledCall> {
        self.recorder.calls()
    }
}

impl Handler for RecordingEvaluator {
    fn metadata(&self) -> &HandlerMetadata {
        &self.recorder.metadata
    }
}

#[async_trait]
impl Evaluator for RecordingEvaluator {
    async fn validate(
        &self,
        _runtime: &AgentRuntime,
        _message: &Message,
        _state: &State,
    ) -> KernelResult<bool> {
        self.recorder.validate()
    }

    async fn handle(
        &self,
        _runtime: &AgentRuntime,
        message: &Message,
        state: &State,
    ) -> KernelResult<Option<Value>> {
        Ok(self.recorder.handle(message, state))
    }
}

/// How a [`ScriptedProvider`] answers `get`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderBehavior {
    /// Returns the text.
    Text(String),
    /// Returns an error.
    Fail,
    /// Panics.
    Panic,
}

/// Provider with a fixed answer that counts its calls.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    behavior: ProviderBehavior,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    /// Creates a provider named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, behavior: ProviderBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    /// Convenience constructor for a provider that returns `text`.
    #[must_use]
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, ProviderBehavior::Text(text.into()))
    }

    /// Number of `get` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, _runtime: &AgentRuntime, _message: &Message) -> KernelResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            ProviderBehavior::Text(text) => Ok(text.clone()),
            ProviderBehavior::Fail => Err(KernelError::handler(
                &self.name,
                "scripted provider failure",
            )),
            ProviderBehavior::Panic => panic!("scripted provider panic in {}", self.name),
        }
    }
}

/// Completion log whose writes always fail. Counts the attempts.
#[derive(Debug, Default)]
pub struct FailingCompletionLog {
    attempts: AtomicUsize,
}

impl FailingCompletionLog {
    /// Creates the log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `record` calls so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionLog for FailingCompletionLog {
    async fn record(&self, _entry: &CompletionLogEntry) -> TelemetryResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TelemetryError::from(io::Error::other("audit disk full")))
    }

    async fn tail(&self, _limit: usize) -> TelemetryResult<Vec<CompletionLogEntry>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use agent_adapters::traits::collect_text;
    use agent_memory::cosine_similarity;

    use super::*;

    #[tokio::test]
    async fn scripted_adapter_replays_then_falls_back() {
        let adapter = ScriptedAdapter::new([ScriptedReply::text("héllo")])
            .with_fallback(ScriptedReply::TransportError);
        let request = InferenceRequest::from_prompt("hi").unwrap();

        let stream = adapter.infer(request.clone()).await.unwrap();
        assert_eq!(collect_text(stream).await.unwrap(), "héllo");
        assert!(matches!(
            adapter.infer(request).await,
            Err(AdapterError::Transport { .. })
        ));
        assert_eq!(adapter.calls(), 2);
        assert_eq!(adapter.prompts(), ["hi", "hi"]);
    }

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("The cat sat").await.unwrap();
        let b = embedder.embed("the CAT sat").await.unwrap();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert_eq!(a.dimensions(), HASH_EMBEDDING_DIMENSIONS);
        assert_eq!(embedder.calls(), 2);
    }
}
