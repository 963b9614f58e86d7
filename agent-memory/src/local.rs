//! In-process [`MemoryStore`] backed by per-domain vectors.

use std::collections::{BTreeSet, HashMap};
use std::cmp::Ordering;

use agent_primitives::{ActorId, MemoryId};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::embeddings::{EmbeddingVector, cosine_similarity};
use crate::record::{MemoryDomain, MemoryRecord};
use crate::store::{AppendOutcome, DUPLICATE_THRESHOLD, MemoryMatch, MemoryStore, SearchOptions};
use crate::MemoryResult;

/// Memory store kept entirely in process memory.
///
/// The duplicate check and the insert run under a single write lock, so two
/// concurrent appends of the same content never both slip past deduplication.
#[derive(Debug)]
pub struct LocalMemoryStore {
    domains: RwLock<HashMap<MemoryDomain, Vec<MemoryRecord>>>,
    duplicate_threshold: f32,
}

impl Default for LocalMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalMemoryStore {
    /// Creates an empty store using [`DUPLICATE_THRESHOLD`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            domains: RwLock::new(HashMap::new()),
            duplicate_threshold: DUPLICATE_THRESHOLD,
        }
    }

    /// Overrides the near-duplicate similarity threshold.
    #[must_use]
    pub fn with_duplicate_threshold(mut self, threshold: f32) -> Self {
        self.duplicate_threshold = threshold;
        self
    }

    fn find_duplicate<'a>(
        &self,
        records: &'a [MemoryRecord],
        candidate: &MemoryRecord,
    ) -> Option<&'a MemoryRecord> {
        let embedding = candidate.embedding()?;
        records
            .iter()
            .filter(|existing| existing.room_id() == candidate.room_id())
            .find(|existing| {
                existing
                    .embedding()
                    .is_some_and(|other| cosine_similarity(embedding, other) >= self.duplicate_threshold)
            })
    }
}

fn newest_first(lhs: &MemoryRecord, rhs: &MemoryRecord) -> Ordering {
    rhs.created_at().cmp(&lhs.created_at())
}

#[async_trait]
impl MemoryStore for LocalMemoryStore {
    async fn append(
        &self,
        domain: &MemoryDomain,
        record: MemoryRecord,
        dedupe: bool,
    ) -> MemoryResult<AppendOutcome> {
        let mut guard = self.domains.write().await;
        let records = guard.entry(domain.clone()).or_default();

        let duplicate = self.find_duplicate(records, &record).map(MemoryRecord::id);
        let outcome = match duplicate {
            Some(existing) if dedupe => {
                debug!(%domain, duplicate_of = %existing, "skipping near-duplicate memory");
                return Ok(AppendOutcome::Skipped {
                    duplicate_of: existing,
                });
            }
            Some(_) => {
                records.push(record.into_duplicate());
                AppendOutcome::Inserted { unique: false }
            }
            None => {
                records.push(record);
                AppendOutcome::Inserted { unique: true }
            }
        };
        Ok(outcome)
    }

    async fn get_recent(
        &self,
        domain: &MemoryDomain,
        owners: &BTreeSet<ActorId>,
        limit: usize,
        unique_only: bool,
    ) -> MemoryResult<Vec<MemoryRecord>> {
        let guard = self.domains.read().await;
        let Some(records) = guard.get(domain) else {
            return Ok(Vec::new());
        };
        // Insertion order is chronological; reversing before the stable sort
        // keeps the later insert first when timestamps tie.
        let mut matches: Vec<MemoryRecord> = records
            .iter()
            .rev()
            .filter(|record| record.is_owned_by_all(owners))
            .filter(|record| !unique_only || record.is_unique())
            .cloned()
            .collect();
        matches.sort_by(newest_first);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn search_by_similarity(
        &self,
        domain: &MemoryDomain,
        query: &EmbeddingVector,
        options: &SearchOptions,
    ) -> MemoryResult<Vec<MemoryMatch>> {
        let guard = self.domains.read().await;
        let Some(records) = guard.get(domain) else {
            return Ok(Vec::new());
        };
        let mut matches: Vec<MemoryMatch> = records
            .iter()
            .filter(|record| options.admits(record))
            .filter_map(|record| {
                let similarity = cosine_similarity(query, record.embedding()?);
                (similarity >= options.threshold()).then(|| MemoryMatch {
                    record: record.clone(),
                    similarity,
                })
            })
            .collect();
        matches.sort_by(|lhs, rhs| {
            rhs.similarity
                .partial_cmp(&lhs.similarity)
                .unwrap_or(Ordering::Equal)
        });
        matches.truncate(options.limit());
        Ok(matches)
    }

    async fn count_by_owners(
        &self,
        domain: &MemoryDomain,
        owners: &BTreeSet<ActorId>,
        unique_only: bool,
    ) -> MemoryResult<usize> {
        let guard = self.domains.read().await;
        Ok(guard.get(domain).map_or(0, |records| {
            records
                .iter()
                .filter(|record| record.is_owned_by_all(owners))
                .filter(|record| !unique_only || record.is_unique())
                .count()
        }))
    }

    async fn remove_by_owners(
        &self,
        domain: &MemoryDomain,
        owners: &BTreeSet<ActorId>,
    ) -> MemoryResult<usize> {
        let mut guard = self.domains.write().await;
        let Some(records) = guard.get_mut(domain) else {
            return Ok(0);
        };
        let before = records.len();
        records.retain(|record| !record.is_owned_by_all(owners));
        Ok(before - records.len())
    }

    async fn remove_one(&self, domain: &MemoryDomain, id: MemoryId) -> MemoryResult<bool> {
        let mut guard = self.domains.write().await;
        let Some(records) = guard.get_mut(domain) else {
            return Ok(false);
        };
        let before = records.len();
        records.retain(|record| record.id() != id);
        Ok(records.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agent_primitives::RoomId;
    use chrono::{Duration, Utc};

    use super::*;

    fn vector(values: &[f32]) -> EmbeddingVector {
        EmbeddingVector::new(values.to_vec()).unwrap()
    }

    fn record(room: RoomId, owner: ActorId, text: &str, embedding: &[f32]) -> MemoryRecord {
        MemoryRecord::builder(room, text)
            .owner(owner)
            .embedding(vector(embedding))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn dedupe_skips_near_duplicates() {
        let store = LocalMemoryStore::new();
        let room = RoomId::random();
        let owner = ActorId::random();
        let domain = MemoryDomain::Facts;

        let first = store
            .append(&domain, record(room, owner, "sky is blue", &[1.0, 0.0]), true)
            .await
            .unwrap();
        let second = store
            .append(&domain, record(room, owner, "sky is blue", &[1.0, 0.0]), true)
            .await
            .unwrap();

        assert_eq!(first, AppendOutcome::Inserted { unique: true });
        assert!(matches!(second, AppendOutcome::Skipped { .. }));

        let options = SearchOptions::new().with_threshold(DUPLICATE_THRESHOLD);
        let matches = store
            .search_by_similarity(&domain, &vector(&[1.0, 0.0]), &options)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[tokio::test]
    async fn without_dedupe_second_copy_is_flagged() {
        let store = LocalMemoryStore::new();
        let room = RoomId::random();
        let owner = ActorId::random();
        let domain = MemoryDomain::Messages;
        let owners = BTreeSet::from([owner]);

        store
            .append(&domain, record(room, owner, "hi", &[0.3, 0.4]), false)
            .await
            .unwrap();
        let outcome = store
            .append(&domain, record(room, owner, "hi", &[0.3, 0.4]), false)
            .await
            .unwrap();

        assert_eq!(outcome, AppendOutcome::Inserted { unique: false });
        assert_eq!(store.count_by_owners(&domain, &owners, false).await.unwrap(), 2);
        assert_eq!(store.count_by_owners(&domain, &owners, true).await.unwrap(), 1);

        let recent = store.get_recent(&domain, &owners, 10, false).await.unwrap();
        assert!(!recent[0].is_unique());
        assert!(recent[1].is_unique());
    }

    #[tokio::test]
    async fn duplicates_are_scoped_to_room() {
        let store = LocalMemoryStore::new();
        let owner = ActorId::random();
        let domain = MemoryDomain::Facts;

        store
            .append(&domain, record(RoomId::random(), owner, "x", &[1.0, 1.0]), true)
            .await
            .unwrap();
        let outcome = store
            .append(&domain, record(RoomId::random(), owner, "x", &[1.0, 1.0]), true)
            .await
            .unwrap();
        assert_eq!(outcome, AppendOutcome::Inserted { unique: true });
    }

    #[tokio::test]
    async fn similarity_ranks_closest_first_and_skips_unembedded() {
        let store = LocalMemoryStore::new();
        let room = RoomId::random();
        let owner = ActorId::random();
        let domain = MemoryDomain::Lore;

        store
            .append(&domain, record(room, owner, "unrelated", &[0.2, 1.0]), false)
            .await
            .unwrap();
        store
            .append(&domain, record(room, owner, "close", &[1.0, 0.05]), false)
            .await
            .unwrap();
        let bare = MemoryRecord::builder(room, "no vector").owner(owner).build().unwrap();
        store.append(&domain, bare, false).await.unwrap();

        let matches = store
            .search_by_similarity(&domain, &vector(&[1.0, 0.0]), &SearchOptions::new())
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].record.content().text, "close");
        assert!(matches[0].similarity > matches[1].similarity);
    }

    #[tokio::test]
    async fn recent_is_bounded_and_newest_first() {
        let store = LocalMemoryStore::new();
        let room = RoomId::random();
        let owner = ActorId::random();
        let domain = MemoryDomain::Messages;
        let start = Utc::now();

        for index in 0..5_i64 {
            let record = MemoryRecord::builder(room, format!("message {index}"))
                .owner(owner)
                .created_at(start + Duration::seconds(index))
                .build()
                .unwrap();
            store.append(&domain, record, false).await.unwrap();
        }

        let recent = store
            .get_recent(&domain, &BTreeSet::from([owner]), 3, false)
            .await
            .unwrap();
        let texts: Vec<_> = recent.iter().map(|r| r.content().text.as_str()).collect();
        assert_eq!(texts, ["message 4", "message 3", "message 2"]);
    }

    #[tokio::test]
    async fn removal_by_owner_and_id() {
        let store = LocalMemoryStore::new();
        let room = RoomId::random();
        let alice = ActorId::random();
        let bob = ActorId::random();
        let domain = MemoryDomain::Descriptions;

        let kept = record(room, bob, "bob", &[0.0, 1.0]);
        let kept_id = kept.id();
        store.append(&domain, record(room, alice, "alice", &[1.0, 0.0]), false).await.unwrap();
        store.append(&domain, kept, false).await.unwrap();

        let removed = store
            .remove_by_owners(&domain, &BTreeSet::from([alice]))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.remove_one(&domain, kept_id).await.unwrap());
        assert!(!store.remove_one(&domain, kept_id).await.unwrap());
        assert_eq!(
            store.count_by_owners(&domain, &BTreeSet::new(), false).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn concurrent_dedupe_appends_store_one_record() {
        let store = Arc::new(LocalMemoryStore::new());
        let room = RoomId::random();
        let owner = ActorId::random();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .append(&MemoryDomain::Facts, record(room, owner, "same", &[0.5, 0.5]), true)
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let count = store
            .count_by_owners(&MemoryDomain::Facts, &BTreeSet::from([owner]), false)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
