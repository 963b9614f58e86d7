//! Context composition: gathers everything a prompt may need for one message.

use std::collections::{BTreeSet, HashSet};

use agent_memory::{MemoryManager, MemoryRecord, SearchOptions};
use agent_primitives::{Actor, ActorId, MemoryId, Message};
use tracing::debug;

use crate::providers::collect_provider_text;
use crate::runtime::AgentRuntime;
use crate::state::{DomainMemories, State};
use crate::{KernelError, KernelResult};

impl AgentRuntime {
    /// Builds the state for `message`.
    ///
    /// Actors, every memory domain, goals, lore, provider text, and action
    /// validation are fetched concurrently; evaluators are then validated
    /// against the assembled state.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::UnknownActor`] when the sender cannot be
    /// resolved, and propagates store and embedder failures.
    pub async fn compose_state(&self, message: &Message) -> KernelResult<State> {
        let participants = message.participants();
        let config = self.config();

        let (
            actors,
            recent_messages,
            facts,
            summaries,
            descriptions,
            goals,
            lore,
            providers,
            actions,
        ) = tokio::try_join!(
            self.resolve_actors(message),
            async {
                Ok::<_, KernelError>(
                    self.messages()
                        .get_recent(&participants, config.recent_message_count, false)
                        .await?,
                )
            },
            self.derived_memories(self.facts(), &participants),
            self.derived_memories(self.summaries(), &participants),
            self.derived_memories(self.descriptions(), &participants),
            self.goal_store().get(&participants, true, config.goal_count),
            self.relevant_lore(message),
            async {
                Ok::<_, KernelError>(collect_provider_text(self.providers(), self, message).await)
            },
            async { Ok::<_, KernelError>(self.actions().validate_actions(self, message).await) },
        )?;

        let sender = actors
            .iter()
            .find(|actor| actor.id() == message.sender)
            .cloned()
            .ok_or(KernelError::UnknownActor(message.sender))?;

        let mut state = State {
            agent: self.agent().clone(),
            sender,
            message: message.clone(),
            actors,
            goals,
            recent_messages,
            facts,
            summaries,
            descriptions,
            lore,
            providers,
            actions,
            evaluators: Vec::new(),
        };
        state.evaluators = self
            .evaluators()
            .validate_evaluators(self, message, &state)
            .await;

        debug!(
            room_id = %message.room_id,
            recent_messages = state.recent_messages.len(),
            facts = state.facts.recent.len() + state.facts.relevant.len(),
            goals = state.goals.len(),
            lore = state.lore.len(),
            actions = state.actions.len(),
            evaluators = state.evaluators.len(),
            "state composed"
        );
        Ok(state)
    }

    /// Re-reads the dialogue window so the state includes replies written
    /// since it was composed.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn refresh_recent_messages(&self, state: &mut State) -> KernelResult<()> {
        state.recent_messages = self
            .messages()
            .get_recent(
                &state.message.participants(),
                self.config().recent_message_count,
                false,
            )
            .await?;
        Ok(())
    }

    /// Resolves the message participants. The agent's own profile always
    /// comes from the runtime, even when the resolver does not know it.
    async fn resolve_actors(&self, message: &Message) -> KernelResult<Vec<Actor>> {
        let ids: Vec<ActorId> = message.participants().into_iter().collect();
        let mut actors = self.accounts().get_actors(&ids).await?;
        actors.retain(|actor| actor.id() != self.agent().id());
        actors.push(self.agent().clone());
        Ok(actors)
    }

    /// Recent records for a derived domain, plus older related ones when the
    /// recent window is full and the store holds more than a window's worth.
    async fn derived_memories(
        &self,
        manager: &MemoryManager,
        owners: &BTreeSet<ActorId>,
    ) -> KernelResult<DomainMemories> {
        let bound = self.config().derived_memory_count();
        let recent = manager.get_recent(owners, bound, true).await?;
        if recent.len() < bound {
            return Ok(DomainMemories {
                recent,
                relevant: Vec::new(),
            });
        }

        let total = manager.count_by_owners(owners, true).await?;
        let anchor = recent.first().and_then(MemoryRecord::embedding).cloned();
        let Some(anchor) = anchor.filter(|_| total >= self.config().recent_message_count) else {
            return Ok(DomainMemories {
                recent,
                relevant: Vec::new(),
            });
        };

        let options = SearchOptions::new()
            .with_owners(owners.iter().copied())
            .with_threshold(self.config().match_threshold)
            .with_limit(bound)
            .unique_only(true);
        let shown: HashSet<MemoryId> = recent.iter().map(MemoryRecord::id).collect();
        let relevant = manager
            .search_by_embedding(&anchor, &options)
            .await?
            .into_iter()
            .map(|found| found.record)
            .filter(|record| !shown.contains(&record.id()))
            .collect();
        Ok(DomainMemories { recent, relevant })
    }

    async fn relevant_lore(&self, message: &Message) -> KernelResult<Vec<MemoryRecord>> {
        if message.content.is_blank() {
            return Ok(Vec::new());
        }
        let options = SearchOptions::new()
            .with_threshold(self.config().lore_match_threshold)
            .with_limit(self.config().lore_match_count);
        let matches = self
            .lore()
            .search_by_text(&message.content.text, &options)
            .await?;
        Ok(matches.into_iter().map(|found| found.record).collect())
    }
}
