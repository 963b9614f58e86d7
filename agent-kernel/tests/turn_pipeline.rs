mod support;

use std::sync::Arc;

use agent_config::RuntimeConfig;
use agent_kernel::testing::{
    FailingCompletionLog, ProviderBehavior, RecordingAction, RecordingEvaluator, ScriptedAdapter,
    ScriptedProvider, ScriptedReply, ValidateBehavior,
};
use agent_kernel::{
    AgentRuntime, Evaluator, Goal, GoalStatus, Handler, HandlerMetadata, KernelError,
    KernelResult, Objective, State,
};
use agent_memory::MemoryRecord;
use agent_primitives::{ActorId, Content, GoalId, Message};
use async_trait::async_trait;
use serde_json::{Value, json};

use support::{Harness, dialogue, selection};

fn texts(records: &[MemoryRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| record.content().text.clone())
        .collect()
}

#[tokio::test]
async fn failing_validators_do_not_hide_other_actions() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    harness.adapter.push(harness.reply("*waves*", "WAVE"));
    let failing = Arc::new(RecordingAction::new("FAILING", ValidateBehavior::Fail).unwrap());
    let panicky = Arc::new(RecordingAction::new("PANICKY", ValidateBehavior::Panic).unwrap());
    let wave = Arc::new(
        RecordingAction::new("WAVE", ValidateBehavior::Accept)
            .unwrap()
            .with_output(json!({ "waved": true })),
    );
    let runtime = harness
        .builder()
        .register_action(failing.clone())
        .unwrap()
        .register_action(panicky.clone())
        .unwrap()
        .register_action(wave.clone())
        .unwrap()
        .build()
        .unwrap();

    let outcome = runtime
        .handle_message(harness.message("Wave at me"))
        .await
        .unwrap();

    assert_eq!(outcome.action_output, Some(json!({ "waved": true })));
    assert_eq!(failing.validations(), 1);
    assert_eq!(panicky.validations(), 1);
    assert_eq!(wave.validations(), 1);
    assert_eq!(wave.calls().len(), 1);
    assert!(failing.calls().is_empty());

    let prompts = harness.adapter.prompts();
    let prompt = &prompts[0];
    assert!(prompt.contains("WAVE"));
    assert!(!prompt.contains("FAILING"));
    assert!(!prompt.contains("PANICKY"));
}

#[tokio::test]
async fn duplicate_action_names_are_rejected() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    let duplicate = RecordingAction::new("NONE", ValidateBehavior::Accept).unwrap();

    let err = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .register_action(Arc::new(duplicate))
        .unwrap_err();

    assert!(matches!(
        err,
        KernelError::DuplicateRegistration { kind: "action", ref name } if name == "NONE"
    ));
}

#[tokio::test]
async fn unregistered_action_in_reply_is_skipped() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    harness.adapter.push(harness.reply("Let me dance", "DANCE"));
    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .build()
        .unwrap();

    let outcome = runtime
        .handle_message(harness.message("Dance for me"))
        .await
        .unwrap();

    assert!(!outcome.fallback);
    assert_eq!(outcome.reply.action.as_deref(), Some("DANCE"));
    assert_eq!(outcome.action_output, None);
}

#[tokio::test]
async fn evaluators_see_the_stored_reply() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    harness.adapter.push(harness.reply("Nice to meet you, Bob", "NONE"));
    harness.adapter.push(selection(&["NOTES"]));
    let notes = Arc::new(RecordingEvaluator::new("NOTES", ValidateBehavior::Accept).unwrap());
    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .register_evaluator(notes.clone())
        .unwrap()
        .build()
        .unwrap();

    let outcome = runtime
        .handle_message(harness.message("I'm Bob"))
        .await
        .unwrap();

    assert_eq!(outcome.evaluators_run, ["NOTES"]);
    let calls = notes.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].message_text, "I'm Bob");
    assert_eq!(calls[0].recent_messages, ["Nice to meet you, Bob", "I'm Bob"]);
}

#[tokio::test]
async fn only_selected_evaluators_run() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    harness.adapter.push(harness.reply("Noted", "NONE"));
    harness.adapter.push(selection(&["AUDIT", "SKIPPED", "MISSING"]));
    let notes = Arc::new(RecordingEvaluator::new("NOTES", ValidateBehavior::Accept).unwrap());
    let audit = Arc::new(RecordingEvaluator::new("AUDIT", ValidateBehavior::Accept).unwrap());
    let skipped = Arc::new(RecordingEvaluator::new("SKIPPED", ValidateBehavior::Reject).unwrap());
    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .register_evaluator(notes.clone())
        .unwrap()
        .register_evaluator(audit.clone())
        .unwrap()
        .register_evaluator(skipped.clone())
        .unwrap()
        .build()
        .unwrap();

    let outcome = runtime
        .handle_message(harness.message("Remember this"))
        .await
        .unwrap();

    assert_eq!(outcome.evaluators_run, ["AUDIT"]);
    assert!(notes.calls().is_empty());
    assert_eq!(audit.calls().len(), 1);
    assert!(skipped.calls().is_empty());
    assert_eq!(skipped.validations(), 1);
}

#[tokio::test]
async fn no_selection_call_without_validated_evaluators() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    harness.adapter.push(harness.reply("Hello", "NONE"));
    let quiet = Arc::new(RecordingEvaluator::new("QUIET", ValidateBehavior::Reject).unwrap());
    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .register_evaluator(quiet.clone())
        .unwrap()
        .build()
        .unwrap();

    let outcome = runtime.handle_message(harness.message("Hi")).await.unwrap();

    assert!(outcome.evaluators_run.is_empty());
    assert_eq!(harness.adapter.calls(), 1);
}

#[tokio::test]
async fn fallback_turn_writes_only_the_inbound_message() {
    let harness = Harness::new(ScriptedAdapter::always(ScriptedReply::text("no json here")));
    let notes = Arc::new(RecordingEvaluator::new("NOTES", ValidateBehavior::Accept).unwrap());
    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .register_evaluator(notes.clone())
        .unwrap()
        .build()
        .unwrap();
    let message = harness.message("Hello?");

    let outcome = runtime.handle_message(message.clone()).await.unwrap();

    assert!(outcome.fallback);
    assert!(outcome.evaluators_run.is_empty());
    assert!(notes.calls().is_empty());
    assert_eq!(harness.adapter.calls(), 3);
    assert_eq!(dialogue(&runtime, &message).await, ["Hello?"]);
}

#[tokio::test]
async fn misaddressed_message_is_rejected_before_any_work() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .build()
        .unwrap();
    let message = Message::new(harness.user.id(), ActorId::random(), harness.room, "Hi");

    let err = runtime.handle_message(message.clone()).await.unwrap_err();

    assert!(matches!(err, KernelError::Misaddressed { .. }));
    assert_eq!(harness.adapter.calls(), 0);
    assert!(dialogue(&runtime, &message).await.is_empty());
}

#[tokio::test]
async fn unknown_sender_abandons_the_turn() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .build()
        .unwrap();
    let stranger = ActorId::random();
    let message = Message::new(stranger, harness.agent.id(), harness.room, "Who am I?");

    let err = runtime.handle_message(message).await.unwrap_err();

    assert!(matches!(err, KernelError::UnknownActor(id) if id == stranger));
    assert_eq!(harness.adapter.calls(), 0);
}

#[tokio::test]
async fn continue_adds_one_follow_up() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    harness.adapter.push(harness.reply("First part", "CONTINUE"));
    harness.adapter.push(harness.reply("Second part", "NONE"));
    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .build()
        .unwrap();
    let message = harness.message("Tell me a story");

    let outcome = runtime.handle_message(message.clone()).await.unwrap();

    assert_eq!(
        outcome.action_output,
        Some(json!({ "text": "Second part", "action": "NONE" }))
    );
    assert_eq!(harness.adapter.calls(), 2);
    assert_eq!(
        dialogue(&runtime, &message).await,
        ["Second part", "First part", "Tell me a story"]
    );
}

#[tokio::test]
async fn continue_stops_validating_after_a_streak() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    harness.adapter.push(harness.reply("And another thing", "CONTINUE"));
    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .build()
        .unwrap();
    let message = harness.message("Go on");
    for part in ["One", "Two", "Three"] {
        runtime
            .store_agent_message(&message, &Content::text(part).with_action("CONTINUE"))
            .await
            .unwrap();
    }

    let outcome = runtime.handle_message(message.clone()).await.unwrap();

    assert_eq!(outcome.reply.action.as_deref(), Some("CONTINUE"));
    assert_eq!(outcome.action_output, None);
    assert_eq!(harness.adapter.calls(), 1);
    assert_eq!(
        dialogue(&runtime, &message).await,
        ["And another thing", "Go on", "Three", "Two", "One"]
    );
}

#[tokio::test]
async fn continue_streak_resets_after_another_action() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .build()
        .unwrap();
    let message = harness.message("Go on");
    for (part, action) in [("One", "CONTINUE"), ("Two", "CONTINUE"), ("Done", "NONE")] {
        runtime
            .store_agent_message(&message, &Content::text(part).with_action(action))
            .await
            .unwrap();
    }

    let state = runtime.compose_state(&message).await.unwrap();

    assert!(state.has_action("CONTINUE"));
}

#[tokio::test]
async fn failing_providers_are_skipped() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    harness.adapter.push(harness.reply("Sunny, I hear", "NONE"));
    let broken = Arc::new(ScriptedProvider::new("broken", ProviderBehavior::Fail));
    let panicky = Arc::new(ScriptedProvider::new("panicky", ProviderBehavior::Panic));
    let weather = Arc::new(ScriptedProvider::text("weather", "It is sunny in Lisbon."));
    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .provider(broken.clone())
        .provider(panicky.clone())
        .provider(weather.clone())
        .build()
        .unwrap();
    let message = harness.message("How is the weather?");

    let state = runtime.compose_state(&message).await.unwrap();
    assert_eq!(state.providers, "It is sunny in Lisbon.");

    let outcome = runtime.handle_message(message).await.unwrap();

    assert!(!outcome.fallback);
    assert_eq!(outcome.reply.text, "Sunny, I hear");
    assert_eq!(broken.calls(), 2);
    assert_eq!(panicky.calls(), 2);
    assert_eq!(weather.calls(), 2);
    let prompts = harness.adapter.prompts();
    assert!(prompts[0].contains("It is sunny in Lisbon."));
}

#[tokio::test]
async fn audit_log_failures_do_not_fail_the_turn() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    harness.adapter.push(harness.reply("Still here", "NONE"));
    let log = Arc::new(FailingCompletionLog::new());
    let runtime = harness
        .builder()
        .completion_log(log.clone())
        .with_default_actions()
        .unwrap()
        .build()
        .unwrap();
    let message = harness.message("Are you there?");

    let outcome = runtime.handle_message(message.clone()).await.unwrap();

    assert!(!outcome.fallback);
    assert!(outcome.reply_stored);
    assert_eq!(log.attempts(), 1);
    assert!(harness.log.entries().is_empty());
    assert_eq!(
        dialogue(&runtime, &message).await,
        ["Still here", "Are you there?"]
    );
}

/// Closes a goal from inside the turn, ahead of the goal evaluator.
struct GoalCloser {
    metadata: HandlerMetadata,
    goal: GoalId,
}

impl Handler for GoalCloser {
    fn metadata(&self) -> &HandlerMetadata {
        &self.metadata
    }
}

#[async_trait]
impl Evaluator for GoalCloser {
    async fn validate(
        &self,
        _runtime: &AgentRuntime,
        _message: &Message,
        _state: &State,
    ) -> KernelResult<bool> {
        Ok(true)
    }

    async fn handle(
        &self,
        runtime: &AgentRuntime,
        _message: &Message,
        _state: &State,
    ) -> KernelResult<Option<Value>> {
        runtime
            .goal_store()
            .set_status(self.goal, GoalStatus::Done)
            .await?;
        Ok(None)
    }
}

#[tokio::test]
async fn goal_evaluator_skips_updates_to_goals_closed_mid_turn() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    let message = harness.message("We made it out");
    let goal = Goal::new(
        message.participants(),
        "Escape the tower",
        vec![Objective::new("Find the key")],
    )
    .unwrap();
    let key = goal.objectives()[0].id;

    harness.adapter.push(harness.reply("Free at last", "NONE"));
    harness.adapter.push(selection(&["CLOSER", "GOALS"]));
    harness.adapter.push(ScriptedReply::text(
        json!([{
            "id": goal.id().to_string(),
            "status": "FAILED",
            "objectives": [{ "id": key.to_string(), "completed": true }],
        }])
        .to_string(),
    ));

    let closer = GoalCloser {
        metadata: HandlerMetadata::new("CLOSER", "Closes the goal").unwrap(),
        goal: goal.id(),
    };
    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .register_evaluator(Arc::new(closer))
        .unwrap()
        .with_default_evaluators()
        .unwrap()
        .build()
        .unwrap();
    runtime.goal_store().create(goal.clone()).await.unwrap();

    let outcome = runtime.handle_message(message).await.unwrap();

    assert_eq!(outcome.evaluators_run, ["CLOSER", "GOALS"]);
    let stored = runtime.goal_store().find(goal.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), GoalStatus::Done);
    assert!(stored.objective(key).unwrap().completed);
}

#[tokio::test]
async fn goal_evaluator_completes_objectives_without_closing_goal() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    let message = harness.message("I found the key!");
    let goal = Goal::new(
        message.participants(),
        "Escape the tower",
        vec![Objective::new("Find the key"), Objective::new("Open the door")],
    )
    .unwrap();
    let key = goal.objectives()[0].id;

    harness.adapter.push(harness.reply("Well done", "NONE"));
    harness.adapter.push(selection(&["GOALS"]));
    harness.adapter.push(ScriptedReply::text(
        json!([{
            "id": goal.id().to_string(),
            "objectives": [{ "id": key.to_string(), "completed": true }],
        }])
        .to_string(),
    ));

    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .with_default_evaluators()
        .unwrap()
        .build()
        .unwrap();
    runtime.goal_store().create(goal.clone()).await.unwrap();

    let outcome = runtime.handle_message(message).await.unwrap();

    assert_eq!(outcome.evaluators_run, ["GOALS"]);
    let stored = runtime.goal_store().find(goal.id()).await.unwrap().unwrap();
    assert!(stored.objective(key).unwrap().completed);
    assert!(!stored.objectives()[1].completed);
    assert_eq!(stored.status(), GoalStatus::InProgress);
}

#[tokio::test]
async fn fact_evaluator_stores_new_facts_once() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    let facts = json!([
        { "claim": "Bob has a cat named Pixel", "type": "fact" },
        { "claim": "Cats are the best", "type": "opinion" },
    ])
    .to_string();
    for _ in 0..2 {
        harness.adapter.push(harness.reply("A cat!", "NONE"));
        harness.adapter.push(selection(&["FACTS"]));
        harness.adapter.push(ScriptedReply::text(facts.clone()));
    }
    let runtime = harness
        .builder()
        .with_default_actions()
        .unwrap()
        .with_default_evaluators()
        .unwrap()
        .build()
        .unwrap();
    let message = harness.message("My cat is called Pixel");

    for _ in 0..2 {
        let outcome = runtime.handle_message(message.clone()).await.unwrap();
        assert_eq!(outcome.evaluators_run, ["FACTS"]);
    }

    let stored = runtime
        .facts()
        .get_recent(&message.participants(), 10, true)
        .await
        .unwrap();
    let texts: Vec<_> = stored
        .iter()
        .map(|record| record.content().text.as_str())
        .collect();
    assert_eq!(texts, ["Bob has a cat named Pixel"]);
}

#[tokio::test]
async fn composed_state_mixes_recent_and_relevant_memories() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    let config = RuntimeConfig {
        recent_message_count: 4,
        match_threshold: 0.5,
        lore_match_threshold: 0.3,
        ..RuntimeConfig::default()
    };
    let runtime = harness.builder_with(config).build().unwrap();
    let message = harness.message("Do you serve green tea?");

    for claim in [
        "Bob likes green tea",
        "Bob plays the violin",
        "Bob lives in Lisbon",
        "Bob drinks green tea daily",
    ] {
        let record = MemoryRecord::builder(harness.room, claim)
            .owners(message.participants())
            .build()
            .unwrap();
        runtime.facts().create_memory(record, true).await.unwrap();
    }
    for lore in ["The tavern serves green tea", "Dragons sleep under mountains"] {
        let record = MemoryRecord::builder(harness.room, lore).build().unwrap();
        runtime.lore().create_memory(record, false).await.unwrap();
    }

    let state = runtime.compose_state(&message).await.unwrap();

    assert_eq!(
        texts(&state.facts.recent),
        ["Bob drinks green tea daily", "Bob lives in Lisbon"]
    );
    assert_eq!(texts(&state.facts.relevant), ["Bob likes green tea"]);
    assert!(state.summaries.recent.is_empty());
    assert_eq!(texts(&state.lore), ["The tavern serves green tea"]);
    assert_eq!(state.sender.display_name(), "Bob");
    assert_eq!(state.actors.len(), 2);
}

#[tokio::test]
async fn scheduled_turns_run_and_shutdown_refuses_more() {
    let harness = Harness::new(ScriptedAdapter::always(support::reply_from(
        "Ada", "Hello", "NONE",
    )));
    let runtime = Arc::new(
        harness
            .builder()
            .with_default_actions()
            .unwrap()
            .build()
            .unwrap(),
    );

    let first = runtime.schedule_message(harness.message("One")).unwrap();
    let second = runtime
        .schedule_message(Message::new(
            harness.user.id(),
            harness.agent.id(),
            agent_primitives::RoomId::random(),
            "Two",
        ))
        .unwrap();

    assert!(!first.join().await.unwrap().fallback);
    assert!(!second.join().await.unwrap().fallback);
    assert_eq!(harness.adapter.calls(), 2);

    runtime.shutdown();
    let err = runtime
        .schedule_message(harness.message("Three"))
        .unwrap_err();
    assert!(matches!(err, KernelError::Scheduler(_)));
}

#[tokio::test]
async fn relationships_are_symmetric_and_idempotent() {
    let harness = Harness::new(ScriptedAdapter::new([]));
    let runtime = harness.builder().build().unwrap();
    let (ada, bob) = (harness.agent.id(), harness.user.id());

    let first = runtime.ensure_relationship(ada, bob).await.unwrap();
    let again = runtime.ensure_relationship(bob, ada).await.unwrap();

    assert_eq!(first, again);
    assert!(matches!(
        runtime.ensure_relationship(ada, ada).await,
        Err(KernelError::SelfRelationship(_))
    ));
}
