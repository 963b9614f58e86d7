//! Storage contract shared by every memory backend.

use std::collections::BTreeSet;

use agent_primitives::{ActorId, MemoryId, RoomId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddingVector;
use crate::record::{MemoryDomain, MemoryRecord};
use crate::MemoryResult;

/// Similarity floor applied when callers do not supply one.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.1;

/// Result count applied when callers do not supply one.
pub const DEFAULT_MATCH_COUNT: usize = 10;

/// Similarity at or above which two records in one room are near duplicates.
pub const DUPLICATE_THRESHOLD: f32 = 0.95;

/// Filters applied to a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    owners: BTreeSet<ActorId>,
    room_id: Option<RoomId>,
    threshold: f32,
    limit: usize,
    unique_only: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            owners: BTreeSet::new(),
            room_id: None,
            threshold: DEFAULT_MATCH_THRESHOLD,
            limit: DEFAULT_MATCH_COUNT,
            unique_only: false,
        }
    }
}

impl SearchOptions {
    /// Creates options with the default threshold and count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts matches to records owned by every supplied actor.
    #[must_use]
    pub fn with_owners<I>(mut self, owners: I) -> Self
    where
        I: IntoIterator<Item = ActorId>,
    {
        self.owners = owners.into_iter().collect();
        self
    }

    /// Restricts matches to a single room.
    #[must_use]
    pub fn with_room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }

    /// Sets the minimum cosine similarity.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the maximum number of matches.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Excludes records flagged as near duplicates.
    #[must_use]
    pub fn unique_only(mut self, unique_only: bool) -> Self {
        self.unique_only = unique_only;
        self
    }

    /// Returns the owner filter.
    #[must_use]
    pub fn owners(&self) -> &BTreeSet<ActorId> {
        &self.owners
    }

    /// Returns the room filter.
    #[must_use]
    pub const fn room_id(&self) -> Option<RoomId> {
        self.room_id
    }

    /// Returns the similarity floor.
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Returns the result cap.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Returns whether near duplicates are excluded.
    #[must_use]
    pub const fn is_unique_only(&self) -> bool {
        self.unique_only
    }

    /// Returns `true` when `record` passes every non-similarity filter.
    #[must_use]
    pub fn admits(&self, record: &MemoryRecord) -> bool {
        record.is_owned_by_all(&self.owners)
            && self.room_id.is_none_or(|room| record.room_id() == room)
            && (!self.unique_only || record.is_unique())
    }
}

/// Record returned from a similarity search together with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryMatch {
    /// Matching record.
    pub record: MemoryRecord,
    /// Cosine similarity against the query.
    pub similarity: f32,
}

/// Result of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record was stored. `unique` is `false` when it was a near duplicate.
    Inserted {
        /// Whether the stored record is unique.
        unique: bool,
    },
    /// Deduplication was requested and an equivalent record already exists.
    Skipped {
        /// Identifier of the existing record.
        duplicate_of: MemoryId,
    },
}

impl AppendOutcome {
    /// Returns `true` when the record was stored.
    #[must_use]
    pub const fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted { .. })
    }
}

/// Append-mostly store of memory records, namespaced by [`MemoryDomain`].
///
/// Owner filters match records whose owner set contains every requested
/// actor; an empty filter matches all records in the domain.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Appends a record.
    ///
    /// With `dedupe` set, a record whose embedding is within
    /// [`DUPLICATE_THRESHOLD`] of an existing record in the same room is not
    /// stored. Without it the record is stored and flagged non-unique.
    async fn append(
        &self,
        domain: &MemoryDomain,
        record: MemoryRecord,
        dedupe: bool,
    ) -> MemoryResult<AppendOutcome>;

    /// Returns at most `limit` records, newest first.
    async fn get_recent(
        &self,
        domain: &MemoryDomain,
        owners: &BTreeSet<ActorId>,
        limit: usize,
        unique_only: bool,
    ) -> MemoryResult<Vec<MemoryRecord>>;

    /// Returns records ordered by descending cosine similarity to `query`.
    /// Records without an embedding never match.
    async fn search_by_similarity(
        &self,
        domain: &MemoryDomain,
        query: &EmbeddingVector,
        options: &SearchOptions,
    ) -> MemoryResult<Vec<MemoryMatch>>;

    /// Counts records matching the owner filter.
    async fn count_by_owners(
        &self,
        domain: &MemoryDomain,
        owners: &BTreeSet<ActorId>,
        unique_only: bool,
    ) -> MemoryResult<usize>;

    /// Removes every record matching the owner filter and returns how many were removed.
    async fn remove_by_owners(
        &self,
        domain: &MemoryDomain,
        owners: &BTreeSet<ActorId>,
    ) -> MemoryResult<usize>;

    /// Removes a single record. Returns `false` when it did not exist.
    async fn remove_one(&self, domain: &MemoryDomain, id: MemoryId) -> MemoryResult<bool>;
}
