//! Symmetric pairings between two actors and the room they share.

use std::collections::HashMap;

use agent_primitives::{ActorId, RoomId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{KernelError, KernelResult};

/// Unordered pair of distinct actors, stored in sorted order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorPair {
    first: ActorId,
    second: ActorId,
}

impl ActorPair {
    /// Creates a pair. `ActorPair::new(a, b) == ActorPair::new(b, a)`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::SelfRelationship`] when both ids are equal.
    pub fn new(a: ActorId, b: ActorId) -> KernelResult<Self> {
        if a == b {
            return Err(KernelError::SelfRelationship(a));
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { first, second })
    }

    /// Returns both actors, lower id first.
    #[must_use]
    pub const fn actors(self) -> (ActorId, ActorId) {
        (self.first, self.second)
    }

    /// Returns `true` when `actor` is one side of the pair.
    #[must_use]
    pub fn contains(self, actor: ActorId) -> bool {
        self.first == actor || self.second == actor
    }
}

/// A pairing plus the room it implies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Related actors.
    pub pair: ActorPair,
    /// Room shared by the pair.
    pub room_id: RoomId,
    /// When the pairing was first created.
    pub created_at: DateTime<Utc>,
}

/// Persistence for relationships.
///
/// `create` is an idempotent upsert: creating an existing pair returns the
/// stored relationship unchanged, so retries after a partial failure are safe.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Creates the relationship (and its room) if absent.
    async fn create(&self, a: ActorId, b: ActorId) -> KernelResult<Relationship>;

    /// Looks up the relationship in either direction.
    async fn get(&self, a: ActorId, b: ActorId) -> KernelResult<Option<Relationship>>;
}

/// In-memory relationship store. Room allocation and the upsert happen under one lock.
#[derive(Debug, Default)]
pub struct LocalRelationshipStore {
    pairs: Mutex<HashMap<ActorPair, Relationship>>,
}

impl LocalRelationshipStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelationshipStore for LocalRelationshipStore {
    async fn create(&self, a: ActorId, b: ActorId) -> KernelResult<Relationship> {
        let pair = ActorPair::new(a, b)?;
        let mut guard = self.pairs.lock().await;
        let relationship = guard.entry(pair).or_insert_with(|| Relationship {
            pair,
            room_id: RoomId::random(),
            created_at: Utc::now(),
        });
        Ok(relationship.clone())
    }

    async fn get(&self, a: ActorId, b: ActorId) -> KernelResult<Option<Relationship>> {
        let pair = ActorPair::new(a, b)?;
        Ok(self.pairs.lock().await.get(&pair).cloned())
    }
}
