#![allow(dead_code)]

use std::sync::Arc;

use agent_config::RuntimeConfig;
use agent_kernel::testing::{HashEmbedder, ScriptedAdapter, ScriptedReply};
use agent_kernel::{AgentRuntime, AgentRuntimeBuilder, LocalAccountResolver};
use agent_primitives::{Actor, ActorId, Message, RoomId};
use agent_telemetry::audit::CollectingCompletionLog;
use serde_json::json;

pub struct Harness {
    pub agent: Actor,
    pub user: Actor,
    pub room: RoomId,
    pub adapter: Arc<ScriptedAdapter>,
    pub log: Arc<CollectingCompletionLog>,
}

impl Harness {
    pub fn new(adapter: ScriptedAdapter) -> Self {
        Self {
            agent: Actor::new(ActorId::random(), "Ada").unwrap(),
            user: Actor::new(ActorId::random(), "Bob").unwrap(),
            room: RoomId::random(),
            adapter: Arc::new(adapter),
            log: Arc::new(CollectingCompletionLog::new()),
        }
    }

    pub fn builder(&self) -> AgentRuntimeBuilder {
        self.builder_with(RuntimeConfig::default())
    }

    pub fn builder_with(&self, config: RuntimeConfig) -> AgentRuntimeBuilder {
        let accounts = LocalAccountResolver::new()
            .with_actor(self.agent.clone())
            .with_actor(self.user.clone());
        AgentRuntime::builder(self.agent.clone())
            .config(config)
            .model(self.adapter.clone())
            .embedder(Arc::new(HashEmbedder::new()))
            .accounts(Arc::new(accounts))
            .completion_log(self.log.clone())
    }

    pub fn message(&self, text: &str) -> Message {
        Message::new(self.user.id(), self.agent.id(), self.room, text)
    }

    pub fn reply(&self, text: &str, action: &str) -> ScriptedReply {
        reply_from(self.agent.display_name(), text, action)
    }
}

pub fn reply_from(speaker: &str, text: &str, action: &str) -> ScriptedReply {
    let body = json!({ "user": speaker, "content": text, "action": action });
    ScriptedReply::text(format!("```json\n{body}\n```"))
}

pub fn selection(names: &[&str]) -> ScriptedReply {
    ScriptedReply::text(json!(names).to_string())
}

pub async fn dialogue(runtime: &AgentRuntime, message: &Message) -> Vec<String> {
    runtime
        .messages()
        .get_recent(&message.participants(), 100, false)
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.content().text.clone())
        .collect()
}
