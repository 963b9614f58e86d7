//! Deadline-bounded access to the generation and embedding adapters.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use agent_adapters::traits::{
    AdapterError, EmbeddingAdapter, InferenceRequest, ModelAdapter, collect_text,
};
use agent_memory::{Embedder, EmbeddingVector, MemoryError, MemoryResult};
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::debug;

use crate::KernelResult;

/// Outcome of a single completion call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Generation {
    /// The backend answered in time.
    Text(String),
    /// The deadline elapsed first.
    TimedOut,
}

/// Wraps a [`ModelAdapter`] with a per-call deadline and sampling defaults.
#[derive(Clone)]
pub struct GenerationBackend {
    model: Arc<dyn ModelAdapter>,
    timeout: Duration,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
}

impl fmt::Debug for GenerationBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationBackend")
            .field("model", &self.model.metadata())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GenerationBackend {
    /// Creates a backend that gives each call `timeout` to finish.
    #[must_use]
    pub fn new(model: Arc<dyn ModelAdapter>, timeout: Duration) -> Self {
        Self {
            model,
            timeout,
            temperature: None,
            max_output_tokens: None,
        }
    }

    /// Sets the sampling temperature sent with every request.
    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the output token cap sent with every request.
    #[must_use]
    pub fn with_max_output_tokens(mut self, max_output_tokens: Option<u32>) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Returns the per-call deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Calls the model once.
    ///
    /// A deadline miss, whether detected here or reported by the adapter,
    /// yields [`Generation::TimedOut`] so callers can spend a retry on it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KernelError::Adapter`] for blank prompts and for
    /// transport or provider failures.
    pub async fn complete(&self, prompt: &str, stop: &[String]) -> KernelResult<Generation> {
        let mut request = InferenceRequest::from_prompt(prompt)?.with_stop_sequences(stop);
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(tokens) = self.max_output_tokens {
            request = request.with_max_output_tokens(tokens);
        }

        let call = async {
            let stream = self.model.infer(request).await?;
            collect_text(stream).await
        };
        match timeout(self.timeout, call).await {
            Ok(Ok(text)) => Ok(Generation::Text(text)),
            Ok(Err(AdapterError::Timeout(after))) => {
                debug!(?after, "adapter reported a timeout");
                Ok(Generation::TimedOut)
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => {
                let metadata = self.model.metadata();
                debug!(
                    provider = metadata.provider(),
                    model = metadata.model(),
                    timeout = ?self.timeout,
                    "completion deadline elapsed"
                );
                Ok(Generation::TimedOut)
            }
        }
    }
}

/// Adapts an [`EmbeddingAdapter`] to the memory layer's [`Embedder`], with a deadline.
#[derive(Clone)]
pub struct AdapterEmbedder {
    adapter: Arc<dyn EmbeddingAdapter>,
    timeout: Duration,
}

impl fmt::Debug for AdapterEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterEmbedder")
            .field("adapter", &self.adapter.metadata())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AdapterEmbedder {
    /// Creates an embedder that gives each call `timeout` to finish.
    #[must_use]
    pub fn new(adapter: Arc<dyn EmbeddingAdapter>, timeout: Duration) -> Self {
        Self { adapter, timeout }
    }
}

#[async_trait]
impl Embedder for AdapterEmbedder {
    async fn embed(&self, text: &str) -> MemoryResult<EmbeddingVector> {
        let values = timeout(self.timeout, self.adapter.embed(text))
            .await
            .map_err(|_| {
                MemoryError::embedding(format!("embedding timed out after {:?}", self.timeout))
            })?
            .map_err(|err| MemoryError::embedding(err.to_string()))?;
        EmbeddingVector::new(values)
    }
}
