//! Goals tracked per owner set, and the store that holds them.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use agent_primitives::{ActorId, GoalId, ObjectiveId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{KernelError, KernelResult};

/// Lifecycle of a goal. Only `InProgress` goals accept transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalStatus {
    /// Being worked on.
    InProgress,
    /// Completed successfully.
    Done,
    /// Abandoned.
    Failed,
}

impl GoalStatus {
    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    /// Parses the wire name, case-insensitively.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "IN_PROGRESS" => Some(Self::InProgress),
            "DONE" => Some(Self::Done),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns `true` for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step toward a goal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    /// Objective identifier.
    pub id: ObjectiveId,
    /// What needs doing.
    pub description: String,
    /// Whether the step is done.
    #[serde(default)]
    pub completed: bool,
}

impl Objective {
    /// Creates an incomplete objective.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: ObjectiveId::random(),
            description: description.into(),
            completed: false,
        }
    }
}

/// Something the owners are working toward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    id: GoalId,
    owners: BTreeSet<ActorId>,
    name: String,
    status: GoalStatus,
    objectives: Vec<Objective>,
    created_at: DateTime<Utc>,
}

impl Goal {
    /// Creates an in-progress goal.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidGoal`] for a blank name or an empty owner set.
    pub fn new<I>(owners: I, name: impl Into<String>, objectives: Vec<Objective>) -> KernelResult<Self>
    where
        I: IntoIterator<Item = ActorId>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(KernelError::InvalidGoal {
                reason: "goal name cannot be empty".into(),
            });
        }
        let owners: BTreeSet<_> = owners.into_iter().collect();
        if owners.is_empty() {
            return Err(KernelError::InvalidGoal {
                reason: "goal needs at least one owner".into(),
            });
        }
        Ok(Self {
            id: GoalId::random(),
            owners,
            name,
            status: GoalStatus::InProgress,
            objectives,
            created_at: Utc::now(),
        })
    }

    /// Returns the goal identifier.
    #[must_use]
    pub const fn id(&self) -> GoalId {
        self.id
    }

    /// Returns the owners.
    #[must_use]
    pub fn owners(&self) -> &BTreeSet<ActorId> {
        &self.owners
    }

    /// Returns the goal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> GoalStatus {
        self.status
    }

    /// Returns the objectives in creation order.
    #[must_use]
    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    /// Returns when the goal was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Looks up an objective.
    #[must_use]
    pub fn objective(&self, id: ObjectiveId) -> Option<&Objective> {
        self.objectives.iter().find(|objective| objective.id == id)
    }

    /// Returns `true` when every objective is complete. Does not close the goal.
    #[must_use]
    pub fn all_objectives_completed(&self) -> bool {
        self.objectives.iter().all(|objective| objective.completed)
    }

    fn mark_objective(&mut self, id: ObjectiveId, completed: bool) -> KernelResult<()> {
        let goal = self.id;
        let objective = self
            .objectives
            .iter_mut()
            .find(|objective| objective.id == id)
            .ok_or(KernelError::ObjectiveNotFound {
                goal,
                objective: id,
            })?;
        objective.completed = completed;
        Ok(())
    }

    fn transition(&mut self, to: GoalStatus) -> KernelResult<()> {
        if self.status == to {
            return Ok(());
        }
        if self.status.is_terminal() || !to.is_terminal() {
            return Err(KernelError::InvalidGoalTransition {
                goal: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Goal persistence scoped by owner set.
#[async_trait]
pub trait GoalStore: Send + Sync {
    /// Stores a new goal.
    async fn create(&self, goal: Goal) -> KernelResult<()>;

    /// Returns goals owned by every actor in `owners`, oldest first, capped at `limit`.
    async fn get(
        &self,
        owners: &BTreeSet<ActorId>,
        only_in_progress: bool,
        limit: usize,
    ) -> KernelResult<Vec<Goal>>;

    /// Looks up a single goal.
    async fn find(&self, id: GoalId) -> KernelResult<Option<Goal>>;

    /// Flips an objective's completion flag. Never changes the goal status.
    async fn update_objective(
        &self,
        goal: GoalId,
        objective: ObjectiveId,
        completed: bool,
    ) -> KernelResult<Goal>;

    /// Moves an in-progress goal to a terminal status.
    async fn set_status(&self, goal: GoalId, status: GoalStatus) -> KernelResult<Goal>;

    /// Deletes every goal owned by all of `owners`, returning how many were removed.
    async fn remove_by_owners(&self, owners: &BTreeSet<ActorId>) -> KernelResult<usize>;
}

/// In-memory goal store.
#[derive(Debug, Default)]
pub struct LocalGoalStore {
    goals: RwLock<HashMap<GoalId, Goal>>,
}

impl LocalGoalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify<F>(&self, id: GoalId, change: F) -> KernelResult<Goal>
    where
        F: FnOnce(&mut Goal) -> KernelResult<()> + Send,
    {
        let mut guard = self.goals.write().await;
        let goal = guard.get_mut(&id).ok_or(KernelError::GoalNotFound(id))?;
        change(goal)?;
        Ok(goal.clone())
    }
}

#[async_trait]
impl GoalStore for LocalGoalStore {
    async fn create(&self, goal: Goal) -> KernelResult<()> {
        self.goals.write().await.insert(goal.id, goal);
        Ok(())
    }

    async fn get(
        &self,
        owners: &BTreeSet<ActorId>,
        only_in_progress: bool,
        limit: usize,
    ) -> KernelResult<Vec<Goal>> {
        let guard = self.goals.read().await;
        let mut goals: Vec<Goal> = guard
            .values()
            .filter(|goal| owners.is_subset(&goal.owners))
            .filter(|goal| !only_in_progress || goal.status == GoalStatus::InProgress)
            .cloned()
            .collect();
        goals.sort_by_key(|goal| goal.created_at);
        goals.truncate(limit);
        Ok(goals)
    }

    async fn find(&self, id: GoalId) -> KernelResult<Option<Goal>> {
        Ok(self.goals.read().await.get(&id).cloned())
    }

    async fn update_objective(
        &self,
        goal: GoalId,
        objective: ObjectiveId,
        completed: bool,
    ) -> KernelResult<Goal> {
        self.modify(goal, |goal| goal.mark_objective(objective, completed))
            .await
    }

    async fn set_status(&self, goal: GoalId, status: GoalStatus) -> KernelResult<Goal> {
        self.modify(goal, |goal| goal.transition(status)).await
    }

    async fn remove_by_owners(&self, owners: &BTreeSet<ActorId>) -> KernelResult<usize> {
        let mut guard = self.goals.write().await;
        let before = guard.len();
        guard.retain(|_, goal| !owners.is_subset(&goal.owners));
        Ok(before - guard.len())
    }
}
