//! Built-in evaluators.

use std::time::Duration;

use agent_memory::{AppendOutcome, MemoryRecord};
use agent_primitives::{GoalId, Message, ObjectiveId};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::goals::{Goal, GoalStatus};
use crate::registry::{Evaluator, Handler, HandlerMetadata};
use crate::runtime::AgentRuntime;
use crate::state::State;
use crate::{KernelError, KernelResult};

/// Claim type that gets stored as a fact.
const FACT_TYPE: &str = "fact";

/// Sleeps before every write except the first.
#[derive(Debug)]
struct WritePacer {
    delay: Duration,
    writes: usize,
}

impl WritePacer {
    const fn new(delay: Duration) -> Self {
        Self { delay, writes: 0 }
    }

    async fn pace(&mut self) {
        if self.writes > 0 && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.writes += 1;
    }
}

/// Extracts durable facts from the conversation into the facts domain.
#[derive(Debug, Clone)]
pub struct FactEvaluator {
    metadata: HandlerMetadata,
}

impl Default for FactEvaluator {
    fn default() -> Self {
        Self {
            metadata: HandlerMetadata::builtin(
                "FACTS",
                "Extract new facts about the participants and the world from the conversation.",
            )
            .with_condition("a participant stated something worth remembering"),
        }
    }
}

impl Handler for FactEvaluator {
    fn metadata(&self) -> &HandlerMetadata {
        &self.metadata
    }
}

/// Returns the claim text when the item is a new fact.
fn new_fact(item: &Map<String, Value>) -> Option<&str> {
    let is_fact = item
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.trim().eq_ignore_ascii_case(FACT_TYPE));
    let known = item
        .get("already_known")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    item.get("claim")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|claim| is_fact && !known && !claim.is_empty())
}

#[async_trait]
impl Evaluator for FactEvaluator {
    async fn validate(
        &self,
        _runtime: &AgentRuntime,
        message: &Message,
        _state: &State,
    ) -> KernelResult<bool> {
        Ok(!message.content.is_blank())
    }

    async fn handle(
        &self,
        runtime: &AgentRuntime,
        message: &Message,
        state: &State,
    ) -> KernelResult<Option<Value>> {
        let items = runtime
            .completion()
            .generate_object_array(state, &runtime.templates().fact_extraction, &["claim", "type"])
            .await?;

        let mut pacer = WritePacer::new(runtime.config().evaluator_write_delay());
        let (mut stored, mut skipped) = (0_usize, 0_usize);
        for claim in items.iter().filter_map(new_fact) {
            pacer.pace().await;
            let record = MemoryRecord::builder(message.room_id, claim)
                .owners(message.participants())
                .build()?;
            match runtime.facts().create_memory(record, true).await? {
                AppendOutcome::Inserted { .. } => stored += 1,
                AppendOutcome::Skipped { .. } => skipped += 1,
            }
        }
        debug!(
            room_id = %message.room_id,
            extracted = items.len(),
            stored,
            skipped,
            "facts evaluated"
        );
        Ok(Some(json!({ "stored": stored, "skipped": skipped })))
    }
}

/// Applies objective and status updates to in-progress goals.
#[derive(Debug, Clone)]
pub struct GoalEvaluator {
    metadata: HandlerMetadata,
}

impl Default for GoalEvaluator {
    fn default() -> Self {
        Self {
            metadata: HandlerMetadata::builtin(
                "GOALS",
                "Update goal objectives and status based on the conversation.",
            )
            .with_condition("the conversation made progress on a goal"),
        }
    }
}

impl Handler for GoalEvaluator {
    fn metadata(&self) -> &HandlerMetadata {
        &self.metadata
    }
}

/// One change requested by the model.
#[derive(Debug, PartialEq, Eq)]
enum GoalChange {
    Objective(GoalId, ObjectiveId, bool),
    Status(GoalId, GoalStatus),
}

/// Turns one reported update into changes, dropping references to goals or
/// objectives that are not in `goals` and changes that would be no-ops.
fn goal_changes(item: &Map<String, Value>, goals: &[Goal]) -> Vec<GoalChange> {
    let goal = item
        .get("id")
        .and_then(Value::as_str)
        .and_then(|raw| raw.trim().parse::<GoalId>().ok())
        .and_then(|id| goals.iter().find(|goal| goal.id() == id));
    let Some(goal) = goal else {
        let update = Value::Object(item.clone());
        warn!(%update, "goal update names an unknown goal; skipping");
        return Vec::new();
    };

    let mut changes = Vec::new();
    let objectives = item
        .get("objectives")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for objective in objectives {
        let id = objective
            .get("id")
            .and_then(Value::as_str)
            .and_then(|raw| raw.trim().parse::<ObjectiveId>().ok());
        let completed = objective.get("completed").and_then(Value::as_bool);
        let current = id.and_then(|id| goal.objective(id));
        match (current, completed) {
            (Some(current), Some(completed)) if current.completed != completed => {
                changes.push(GoalChange::Objective(goal.id(), current.id, completed));
            }
            (None, _) => debug!(goal = %goal.id(), "objective update names an unknown objective"),
            _ => {}
        }
    }

    let status = item
        .get("status")
        .and_then(Value::as_str)
        .and_then(GoalStatus::parse)
        .filter(|status| *status != goal.status());
    if let Some(status) = status {
        changes.push(GoalChange::Status(goal.id(), status));
    }
    changes
}

#[async_trait]
impl Evaluator for GoalEvaluator {
    async fn validate(
        &self,
        _runtime: &AgentRuntime,
        _message: &Message,
        state: &State,
    ) -> KernelResult<bool> {
        Ok(state
            .goals
            .iter()
            .any(|goal| goal.status() == GoalStatus::InProgress))
    }

    async fn handle(
        &self,
        runtime: &AgentRuntime,
        message: &Message,
        state: &State,
    ) -> KernelResult<Option<Value>> {
        let items = runtime
            .completion()
            .generate_object_array(state, &runtime.templates().goal_update, &["id"])
            .await?;

        let changes: Vec<GoalChange> = items
            .iter()
            .flat_map(|item| goal_changes(item, &state.goals))
            .collect();
        let mut pacer = WritePacer::new(runtime.config().evaluator_write_delay());
        let mut applied = 0_usize;
        for change in &changes {
            pacer.pace().await;
            let result = match *change {
                GoalChange::Objective(goal, objective, completed) => {
                    runtime
                        .goal_store()
                        .update_objective(goal, objective, completed)
                        .await
                }
                GoalChange::Status(goal, status) => {
                    runtime.goal_store().set_status(goal, status).await
                }
            };
            match result {
                Ok(_) => applied += 1,
                // The goal moved on after the state was composed.
                Err(
                    err @ (KernelError::InvalidGoalTransition { .. }
                    | KernelError::GoalNotFound(_)
                    | KernelError::ObjectiveNotFound { .. }),
                ) => warn!(error = %err, "stale goal update; skipping"),
                Err(err) => return Err(err),
            }
        }
        debug!(
            room_id = %message.room_id,
            requested = changes.len(),
            applied,
            "goals evaluated"
        );
        Ok(Some(json!({ "updated": applied })))
    }
}

#[cfg(test)]
mod tests {
    use agent_primitives::ActorId;

    use super::*;
    use crate::goals::Objective;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn only_new_facts_are_kept() {
        assert_eq!(
            new_fact(&object(json!({ "claim": " Ada owns a cat ", "type": "FACT" }))),
            Some("Ada owns a cat")
        );
        assert_eq!(
            new_fact(&object(json!({ "claim": "x", "type": "fact", "already_known": true }))),
            None
        );
        assert_eq!(new_fact(&object(json!({ "claim": "x", "type": "opinion" }))), None);
        assert_eq!(new_fact(&object(json!({ "claim": " ", "type": "fact" }))), None);
    }

    #[test]
    fn goal_updates_are_checked_against_known_goals() {
        let goal = Goal::new(
            [ActorId::random()],
            "Lighthouse",
            vec![Objective::new("Reach the coast"), Objective::new("Climb")],
        )
        .unwrap();
        let first = goal.objectives()[0].id;
        let second = goal.objectives()[1].id;
        let goals = vec![goal.clone()];

        let changes = goal_changes(
            &object(json!({
                "id": goal.id().to_string(),
                "status": "DONE",
                "objectives": [
                    { "id": first.to_string(), "completed": true },
                    { "id": second.to_string(), "completed": false },
                    { "id": ObjectiveId::random().to_string(), "completed": true },
                ],
            })),
            &goals,
        );
        assert_eq!(
            changes,
            vec![
                GoalChange::Objective(goal.id(), first, true),
                GoalChange::Status(goal.id(), GoalStatus::Done),
            ]
        );

        let unknown = goal_changes(
            &object(json!({ "id": GoalId::random().to_string(), "status": "DONE" })),
            &goals,
        );
        assert!(unknown.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_waits_between_writes_only() {
        let mut pacer = WritePacer::new(Duration::from_millis(100));
        let start = tokio::time::Instant::now();
        pacer.pace().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        pacer.pace().await;
        pacer.pace().await;
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }
}
