//! Per-turn aggregate context.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use agent_memory::MemoryRecord;
use agent_primitives::{Actor, Message, RoomId};

use crate::format;
use crate::goals::Goal;
use crate::registry::{Action, Evaluator};

/// Recent and topically relevant records for one derived-memory domain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DomainMemories {
    /// Newest records, newest first.
    pub recent: Vec<MemoryRecord>,
    /// Older records related to the newest one, excluding anything in `recent`.
    pub relevant: Vec<MemoryRecord>,
}

/// Everything a prompt may draw on for one inbound message.
///
/// Built from scratch for every message and never cached across turns.
#[derive(Clone)]
pub struct State {
    /// The agent answering.
    pub agent: Actor,
    /// The actor who sent the message.
    pub sender: Actor,
    /// Message being answered.
    pub message: Message,
    /// Participants resolved from the message.
    pub actors: Vec<Actor>,
    /// In-progress goals for the participants.
    pub goals: Vec<Goal>,
    /// Dialogue window, newest first.
    pub recent_messages: Vec<MemoryRecord>,
    /// Extracted facts.
    pub facts: DomainMemories,
    /// Rolling summaries.
    pub summaries: DomainMemories,
    /// Descriptions of the participants.
    pub descriptions: DomainMemories,
    /// Background lore relevant to the message text.
    pub lore: Vec<MemoryRecord>,
    /// Text contributed by providers.
    pub providers: String,
    /// Actions whose `validate` accepted the message.
    pub actions: Vec<Arc<dyn Action>>,
    /// Evaluators whose `validate` accepted the preliminary state.
    pub evaluators: Vec<Arc<dyn Evaluator>>,
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("agent", &self.agent.display_name())
            .field("sender", &self.sender.display_name())
            .field("room_id", &self.message.room_id)
            .field("actors", &self.actors.len())
            .field("goals", &self.goals.len())
            .field("recent_messages", &self.recent_messages.len())
            .field("facts", &self.facts.recent.len())
            .field("lore", &self.lore.len())
            .field("actions", &format::format_handler_names(&self.actions))
            .field("evaluators", &format::format_handler_names(&self.evaluators))
            .finish_non_exhaustive()
    }
}

impl State {
    /// Room the turn belongs to.
    #[must_use]
    pub fn room_id(&self) -> RoomId {
        self.message.room_id
    }

    /// Display name of the agent.
    #[must_use]
    pub fn agent_name(&self) -> &str {
        self.agent.display_name()
    }

    /// Returns `true` when an action of this name validated for the turn.
    #[must_use]
    pub fn has_action(&self, name: &str) -> bool {
        self.actions.iter().any(|action| action.name() == name)
    }

    /// Placeholder values for template rendering.
    ///
    /// Keys: `agentName`, `senderName`, `roomId`, `messageText`, `actors`,
    /// `goals`, `recentMessages`, `recentFacts`, `relevantFacts`,
    /// `recentSummaries`, `relevantSummaries`, `recentDescriptions`,
    /// `relevantDescriptions`, `lore`, `providers`, `actions`, `actionNames`,
    /// `evaluators`, `evaluatorNames`.
    #[must_use]
    pub fn template_values(&self) -> HashMap<String, String> {
        let entries = [
            ("agentName", self.agent.display_name().to_owned()),
            ("senderName", self.sender.display_name().to_owned()),
            ("roomId", self.message.room_id.to_string()),
            ("messageText", self.message.content.text.clone()),
            ("actors", format::format_actors(&self.actors)),
            ("goals", format::format_goals(&self.goals)),
            (
                "recentMessages",
                format::format_messages(&self.recent_messages, &self.actors),
            ),
            ("recentFacts", format::format_memories(&self.facts.recent)),
            ("relevantFacts", format::format_memories(&self.facts.relevant)),
            ("recentSummaries", format::format_memories(&self.summaries.recent)),
            (
                "relevantSummaries",
                format::format_memories(&self.summaries.relevant),
            ),
            (
                "recentDescriptions",
                format::format_memories(&self.descriptions.recent),
            ),
            (
                "relevantDescriptions",
                format::format_memories(&self.descriptions.relevant),
            ),
            ("lore", format::format_memories(&self.lore)),
            ("providers", self.providers.clone()),
            ("actions", format::format_handlers(&self.actions)),
            ("actionNames", format::format_handler_names(&self.actions)),
            ("evaluators", format::format_handlers(&self.evaluators)),
            (
                "evaluatorNames",
                format::format_handler_names(&self.evaluators),
            ),
        ];
        entries
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value))
            .collect()
    }
}
