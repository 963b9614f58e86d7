//! Providers contribute free text to the composed state.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use agent_primitives::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::join_all;
use tracing::warn;

use crate::KernelResult;
use crate::runtime::AgentRuntime;

/// Source of contextual text, such as the current time.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns text to append to the composed state.
    async fn get(&self, runtime: &AgentRuntime, message: &Message) -> KernelResult<String>;
}

/// Reports the current UTC time.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeProvider;

impl TimeProvider {
    fn describe(now: DateTime<Utc>) -> String {
        format!(
            "The current time is {} UTC.",
            now.format("%A, %B %-d, %Y %H:%M")
        )
    }
}

#[async_trait]
impl Provider for TimeProvider {
    fn name(&self) -> &str {
        "time"
    }

    async fn get(&self, _runtime: &AgentRuntime, _message: &Message) -> KernelResult<String> {
        Ok(Self::describe(Utc::now()))
    }
}

/// Runs every provider at once and joins their output in registration order.
/// Failing, panicking, or blank providers are skipped.
pub(crate) async fn collect_provider_text(
    providers: &[Arc<dyn Provider>],
    runtime: &AgentRuntime,
    message: &Message,
) -> String {
    let calls = providers
        .iter()
        .map(|provider| AssertUnwindSafe(provider.get(runtime, message)).catch_unwind());
    let results = join_all(calls).await;

    providers
        .iter()
        .zip(results)
        .filter_map(|(provider, result)| match result {
            Ok(Ok(text)) => Some(text).filter(|text| !text.trim().is_empty()),
            Ok(Err(err)) => {
                warn!(provider = provider.name(), error = %err, "provider failed; skipping");
                None
            }
            Err(_) => {
                warn!(provider = provider.name(), "provider panicked; skipping");
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
