//! The agent runtime: owns the registries and collaborators and runs turns.

use std::fmt;
use std::sync::Arc;

use agent_adapters::traits::{EmbeddingAdapter, ModelAdapter};
use agent_config::RuntimeConfig;
use agent_memory::{
    Embedder, LocalMemoryStore, MemoryDomain, MemoryManager, MemoryRecord, MemoryStore,
};
use agent_primitives::{Actor, ActorId, Content, Message};
use agent_telemetry::audit::{CompletionLog, TracingCompletionLog};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::accounts::AccountResolver;
use crate::actions::{ContinueAction, IgnoreAction, NoneAction};
use crate::backend::{AdapterEmbedder, GenerationBackend};
use crate::completion::CompletionLoop;
use crate::evaluators::{FactEvaluator, GoalEvaluator};
use crate::goals::{GoalStore, LocalGoalStore};
use crate::providers::Provider;
use crate::registry::{Action, Evaluator, Registry};
use crate::relationships::{LocalRelationshipStore, Relationship, RelationshipStore};
use crate::scheduler::{SchedulerConfig, SchedulerResult, TurnScheduler};
use crate::templates::Templates;
use crate::{KernelError, KernelResult};

/// What a turn produced.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    /// The agent's reply. An empty `IGNORE` when `fallback` is set.
    pub reply: Content,
    /// `true` when no acceptable reply was generated within the attempt budget.
    pub fallback: bool,
    /// Whether the reply was written to dialogue memory.
    pub reply_stored: bool,
    /// Output of the action named in the reply, if it produced any.
    pub action_output: Option<Value>,
    /// Evaluators that ran, in registration order.
    pub evaluators_run: Vec<String>,
}

impl TurnOutcome {
    fn ignored(reply: Content) -> Self {
        Self {
            reply,
            fallback: true,
            reply_stored: false,
            action_output: None,
            evaluators_run: Vec::new(),
        }
    }
}

/// Handle to a turn running on the scheduler.
#[derive(Debug)]
pub struct TurnHandle {
    inner: JoinHandle<SchedulerResult<KernelResult<TurnOutcome>>>,
}

impl TurnHandle {
    /// Waits for the turn to finish.
    ///
    /// # Errors
    ///
    /// Returns the turn's own error, [`KernelError::Scheduler`] when the
    /// scheduler closed before the turn started, or
    /// [`KernelError::TurnAborted`] when the task panicked or was aborted.
    pub async fn join(self) -> KernelResult<TurnOutcome> {
        match self.inner.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => Err(err.into()),
            Err(err) => Err(KernelError::TurnAborted {
                reason: err.to_string(),
            }),
        }
    }

    /// Cancels the turn. Memories already written stay written.
    pub fn abort(&self) {
        self.inner.abort();
    }
}

/// Conversational agent runtime.
///
/// Constructed once through [`AgentRuntime::builder`]; the action and
/// evaluator registries are fixed from then on. Share it behind an [`Arc`]
/// to process turns for several rooms at once.
pub struct AgentRuntime {
    agent: Actor,
    config: RuntimeConfig,
    messages: MemoryManager,
    facts: MemoryManager,
    summaries: MemoryManager,
    descriptions: MemoryManager,
    lore: MemoryManager,
    accounts: Arc<dyn AccountResolver>,
    goals: Arc<dyn GoalStore>,
    relationships: Arc<dyn RelationshipStore>,
    completion: CompletionLoop,
    actions: Registry<dyn Action>,
    evaluators: Registry<dyn Evaluator>,
    providers: Vec<Arc<dyn Provider>>,
    templates: Templates,
    scheduler: TurnScheduler,
}

impl fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("agent", &self.agent.display_name())
            .field("config", &self.config)
            .field("actions", &self.actions)
            .field("evaluators", &self.evaluators)
            .field("providers", &self.providers.len())
            .finish_non_exhaustive()
    }
}

impl AgentRuntime {
    /// Starts building a runtime for `agent`.
    #[must_use]
    pub fn builder(agent: Actor) -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::new(agent)
    }

    /// The agent this runtime speaks for.
    #[must_use]
    pub fn agent(&self) -> &Actor {
        &self.agent
    }

    /// Validated configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Dialogue history.
    #[must_use]
    pub fn messages(&self) -> &MemoryManager {
        &self.messages
    }

    /// Extracted facts.
    #[must_use]
    pub fn facts(&self) -> &MemoryManager {
        &self.facts
    }

    /// Rolling summaries.
    #[must_use]
    pub fn summaries(&self) -> &MemoryManager {
        &self.summaries
    }

    /// Descriptions of participants.
    #[must_use]
    pub fn descriptions(&self) -> &MemoryManager {
        &self.descriptions
    }

    /// Background lore.
    #[must_use]
    pub fn lore(&self) -> &MemoryManager {
        &self.lore
    }

    /// Account resolver.
    #[must_use]
    pub fn accounts(&self) -> &dyn AccountResolver {
        self.accounts.as_ref()
    }

    /// Goal store.
    #[must_use]
    pub fn goal_store(&self) -> &dyn GoalStore {
        self.goals.as_ref()
    }

    /// Relationship store.
    #[must_use]
    pub fn relationships(&self) -> &dyn RelationshipStore {
        self.relationships.as_ref()
    }

    /// Completion loop used for every model call.
    #[must_use]
    pub fn completion(&self) -> &CompletionLoop {
        &self.completion
    }

    /// Registered actions.
    #[must_use]
    pub fn actions(&self) -> &Registry<dyn Action> {
        &self.actions
    }

    /// Registered evaluators.
    #[must_use]
    pub fn evaluators(&self) -> &Registry<dyn Evaluator> {
        &self.evaluators
    }

    /// Registered providers, in registration order.
    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// Prompt templates.
    #[must_use]
    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    /// Scheduler used by [`AgentRuntime::schedule_message`].
    #[must_use]
    pub fn scheduler(&self) -> &TurnScheduler {
        &self.scheduler
    }

    /// Processes one inbound message to completion on the current task.
    ///
    /// The inbound message is stored, the state composed, and a reply
    /// generated. When no acceptable reply comes back the turn ends with an
    /// `IGNORE` outcome and nothing further is written. Otherwise the reply is
    /// stored before the action and evaluators run, so they see it in the
    /// dialogue window.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Misaddressed`] for messages meant for another
    /// agent. Store, embedder, and transport failures abandon the turn;
    /// memories already written are kept.
    pub async fn handle_message(&self, message: Message) -> KernelResult<TurnOutcome> {
        if message.agent != self.agent.id() {
            return Err(KernelError::Misaddressed {
                agent: self.agent.id(),
                addressed: message.agent,
            });
        }

        self.store_message(&message, message.sender, &message.content)
            .await?;
        let mut state = self.compose_state(&message).await?;

        let response = self
            .completion
            .generate_response(&state, &self.templates.message_handler)
            .await?;
        if response.fallback {
            info!(room_id = %message.room_id, "no usable reply; ignoring message");
            return Ok(TurnOutcome::ignored(response.content));
        }

        let reply_stored = self.store_agent_message(&message, &response.content).await?;
        self.refresh_recent_messages(&mut state).await?;

        let action_output = self
            .process_actions(&message, &response.content, &state)
            .await?;
        if action_output.is_some() {
            self.refresh_recent_messages(&mut state).await?;
        }

        let evaluators_run = self.evaluate(&message, &state).await?;

        info!(
            room_id = %message.room_id,
            action = response.content.action.as_deref().unwrap_or("none"),
            evaluators = ?evaluators_run,
            "turn complete"
        );
        Ok(TurnOutcome {
            reply: response.content,
            fallback: false,
            reply_stored,
            action_output,
            evaluators_run,
        })
    }

    /// Runs [`AgentRuntime::handle_message`] on the turn scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Scheduler`] when the scheduler is closed.
    pub fn schedule_message(self: &Arc<Self>, message: Message) -> KernelResult<TurnHandle> {
        let runtime = Arc::clone(self);
        let inner = self
            .scheduler
            .spawn(async move { runtime.handle_message(message).await })?;
        Ok(TurnHandle { inner })
    }

    /// Stops accepting scheduled turns. Turns already running finish.
    pub fn shutdown(&self) {
        self.scheduler.close();
    }

    /// Creates the symmetric relationship between two actors, or returns the
    /// existing one. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::SelfRelationship`] when `a == b`, or the
    /// store's error.
    pub async fn ensure_relationship(&self, a: ActorId, b: ActorId) -> KernelResult<Relationship> {
        let relationship = self.relationships.create(a, b).await?;
        debug!(room_id = %relationship.room_id, "relationship ensured");
        Ok(relationship)
    }

    /// Writes a reply from the agent into dialogue memory, owned by the
    /// message participants. Returns `false` without writing when the reply
    /// has no text.
    ///
    /// # Errors
    ///
    /// Propagates embedder and store failures.
    pub async fn store_agent_message(
        &self,
        message: &Message,
        content: &Content,
    ) -> KernelResult<bool> {
        self.store_message(message, self.agent.id(), content).await
    }

    async fn store_message(
        &self,
        message: &Message,
        author: ActorId,
        content: &Content,
    ) -> KernelResult<bool> {
        if content.is_blank() {
            debug!(room_id = %message.room_id, %author, "no text to store");
            return Ok(false);
        }
        let record = MemoryRecord::builder(message.room_id, content.clone())
            .owners(message.participants())
            .author(author)
            .build()?;
        self.messages.create_memory(record, false).await?;
        Ok(true)
    }
}

/// Builder for [`AgentRuntime`].
///
/// The model, an embedder, and an account resolver are required. The memory
/// store, goal store, relationship store, and completion log default to
/// in-process implementations.
pub struct AgentRuntimeBuilder {
    agent: Actor,
    config: RuntimeConfig,
    model: Option<Arc<dyn ModelAdapter>>,
    embedder: Option<Arc<dyn Embedder>>,
    embedding_adapter: Option<Arc<dyn EmbeddingAdapter>>,
    store: Option<Arc<dyn MemoryStore>>,
    accounts: Option<Arc<dyn AccountResolver>>,
    goals: Option<Arc<dyn GoalStore>>,
    relationships: Option<Arc<dyn RelationshipStore>>,
    completion_log: Option<Arc<dyn CompletionLog>>,
    actions: Registry<dyn Action>,
    evaluators: Registry<dyn Evaluator>,
    providers: Vec<Arc<dyn Provider>>,
    templates: Templates,
    stop_sequences: Vec<String>,
}

impl fmt::Debug for AgentRuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRuntimeBuilder")
            .field("agent", &self.agent.display_name())
            .field("actions", &self.actions)
            .field("evaluators", &self.evaluators)
            .finish_non_exhaustive()
    }
}

impl AgentRuntimeBuilder {
    fn new(agent: Actor) -> Self {
        Self {
            agent,
            config: RuntimeConfig::default(),
            model: None,
            embedder: None,
            embedding_adapter: None,
            store: None,
            accounts: None,
            goals: None,
            relationships: None,
            completion_log: None,
            actions: Registry::default(),
            evaluators: Registry::default(),
            providers: Vec::new(),
            templates: Templates::default(),
            stop_sequences: Vec::new(),
        }
    }

    /// Replaces the configuration. It is validated in [`Self::build`].
    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the text-generation adapter.
    #[must_use]
    pub fn model(mut self, model: Arc<dyn ModelAdapter>) -> Self {
        self.model = Some(model);
        self
    }

    /// Sets the embedder directly.
    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Embeds through an adapter, bounded by the configured request timeout.
    /// Ignored when [`Self::embedder`] is also set.
    #[must_use]
    pub fn embedding_adapter(mut self, adapter: Arc<dyn EmbeddingAdapter>) -> Self {
        self.embedding_adapter = Some(adapter);
        self
    }

    /// Sets the memory store shared by every domain.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the account resolver.
    #[must_use]
    pub fn accounts(mut self, accounts: Arc<dyn AccountResolver>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// Sets the goal store.
    #[must_use]
    pub fn goals(mut self, goals: Arc<dyn GoalStore>) -> Self {
        self.goals = Some(goals);
        self
    }

    /// Sets the relationship store.
    #[must_use]
    pub fn relationships(mut self, relationships: Arc<dyn RelationshipStore>) -> Self {
        self.relationships = Some(relationships);
        self
    }

    /// Sets the completion audit log.
    #[must_use]
    pub fn completion_log(mut self, log: Arc<dyn CompletionLog>) -> Self {
        self.completion_log = Some(log);
        self
    }

    /// Sets stop sequences sent with every completion.
    #[must_use]
    pub fn stop_sequences<I, S>(mut self, stops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_sequences = stops.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the prompt templates.
    #[must_use]
    pub fn templates(mut self, templates: Templates) -> Self {
        self.templates = templates;
        self
    }

    /// Adds a provider. Output is joined in the order providers are added.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Registers an action.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::DuplicateRegistration`] when the name is taken.
    pub fn register_action(mut self, action: Arc<dyn Action>) -> KernelResult<Self> {
        self.actions.register(action)?;
        Ok(self)
    }

    /// Registers an evaluator.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::DuplicateRegistration`] when the name is taken.
    pub fn register_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> KernelResult<Self> {
        self.evaluators.register(evaluator)?;
        Ok(self)
    }

    /// Registers `IGNORE`, `NONE`, and `CONTINUE`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::DuplicateRegistration`] if any is already registered.
    pub fn with_default_actions(self) -> KernelResult<Self> {
        self.register_action(Arc::new(IgnoreAction::default()))?
            .register_action(Arc::new(NoneAction::default()))?
            .register_action(Arc::new(ContinueAction::default()))
    }

    /// Registers `FACTS` and `GOALS`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::DuplicateRegistration`] if either is already registered.
    pub fn with_default_evaluators(self) -> KernelResult<Self> {
        self.register_evaluator(Arc::new(FactEvaluator::default()))?
            .register_evaluator(Arc::new(GoalEvaluator::default()))
    }

    /// Validates the configuration and assembles the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Config`] for an invalid configuration and
    /// [`KernelError::MissingComponent`] when the model, embedder, or account
    /// resolver is absent.
    pub fn build(self) -> KernelResult<AgentRuntime> {
        let config = self.config;
        config.validate()?;

        let model = self.model.ok_or(KernelError::MissingComponent("model adapter"))?;
        let embedder: Arc<dyn Embedder> = match (self.embedder, self.embedding_adapter) {
            (Some(embedder), _) => embedder,
            (None, Some(adapter)) => {
                Arc::new(AdapterEmbedder::new(adapter, config.request_timeout()))
            }
            (None, None) => return Err(KernelError::MissingComponent("embedder")),
        };
        let accounts = self
            .accounts
            .ok_or(KernelError::MissingComponent("account resolver"))?;
        let store: Arc<dyn MemoryStore> = match self.store {
            Some(store) => store,
            None => Arc::new(
                LocalMemoryStore::new().with_duplicate_threshold(config.duplicate_threshold),
            ),
        };

        let manager = |domain: MemoryDomain| {
            MemoryManager::builder(domain)
                .store(Arc::clone(&store))
                .embedder(Arc::clone(&embedder))
                .build()
        };

        let backend = GenerationBackend::new(model, config.request_timeout())
            .with_temperature(config.temperature)
            .with_max_output_tokens(config.max_output_tokens);
        let log: Arc<dyn CompletionLog> = match self.completion_log {
            Some(log) => log,
            None => Arc::new(TracingCompletionLog),
        };
        let goals: Arc<dyn GoalStore> = match self.goals {
            Some(goals) => goals,
            None => Arc::new(LocalGoalStore::new()),
        };
        let relationships: Arc<dyn RelationshipStore> = match self.relationships {
            Some(relationships) => relationships,
            None => Arc::new(LocalRelationshipStore::new()),
        };
        let completion = CompletionLoop::new(backend, log, config.completion_attempts)
            .with_stop_sequences(self.stop_sequences);

        Ok(AgentRuntime {
            messages: manager(MemoryDomain::Messages)?,
            facts: manager(MemoryDomain::Facts)?,
            summaries: manager(MemoryDomain::Summaries)?,
            descriptions: manager(MemoryDomain::Descriptions)?,
            lore: manager(MemoryDomain::Lore)?,
            scheduler: TurnScheduler::new(SchedulerConfig::from_count(config.max_concurrent_turns)),
            agent: self.agent,
            config,
            accounts,
            goals,
            relationships,
            completion,
            actions: self.actions,
            evaluators: self.evaluators,
            providers: self.providers,
            templates: self.templates,
        })
    }
}
