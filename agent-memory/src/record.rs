//! Shared record types for the memory subsystem.

use std::collections::BTreeSet;
use std::fmt;

use agent_primitives::{ActorId, Content, MemoryId, RoomId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddingVector;
use crate::{MemoryError, MemoryResult};

/// Semantic namespace a memory belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryDomain {
    /// Dialogue history.
    Messages,
    /// Durable facts extracted from conversation.
    Facts,
    /// Rolling summaries of earlier conversation.
    Summaries,
    /// Narrative background shared across rooms.
    Lore,
    /// Descriptions of actors.
    Descriptions,
    /// Custom domain registered by implementers.
    Custom(String),
}

impl MemoryDomain {
    /// Creates a [`MemoryDomain::Custom`] value after validating the provided name.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRecord`] when the supplied label is empty.
    pub fn custom(label: impl Into<String>) -> MemoryResult<Self> {
        let value = label.into();
        if value.trim().is_empty() {
            return Err(MemoryError::InvalidRecord(
                "custom memory domain label must not be empty",
            ));
        }
        Ok(Self::Custom(value))
    }

    /// Returns the storage label of the domain.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Messages => "messages",
            Self::Facts => "facts",
            Self::Summaries => "summaries",
            Self::Lore => "lore",
            Self::Descriptions => "descriptions",
            Self::Custom(label) => label,
        }
    }
}

impl fmt::Display for MemoryDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes a single stored piece of memory.
///
/// Records are immutable once appended; the only way to change what a store
/// holds is to append or remove.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    id: MemoryId,
    owners: BTreeSet<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<ActorId>,
    room_id: RoomId,
    content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding: Option<EmbeddingVector>,
    created_at: DateTime<Utc>,
    #[serde(default = "default_unique")]
    unique: bool,
}

const fn default_unique() -> bool {
    true
}

impl MemoryRecord {
    /// Creates a builder for a new memory record.
    #[must_use]
    pub fn builder(room_id: RoomId, content: impl Into<Content>) -> MemoryRecordBuilder {
        MemoryRecordBuilder {
            id: MemoryId::random(),
            owners: BTreeSet::new(),
            author: None,
            room_id,
            content: content.into(),
            embedding: None,
            created_at: Utc::now(),
        }
    }

    /// Returns the unique identifier for this record.
    #[must_use]
    pub const fn id(&self) -> MemoryId {
        self.id
    }

    /// Returns the actors this record is about or addressed to.
    #[must_use]
    pub fn owners(&self) -> &BTreeSet<ActorId> {
        &self.owners
    }

    /// Returns the actor who wrote the content, when known.
    #[must_use]
    pub const fn author(&self) -> Option<ActorId> {
        self.author
    }

    /// Returns the room the record belongs to.
    #[must_use]
    pub const fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Returns the payload.
    #[must_use]
    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Returns the optional embedding associated with the record.
    #[must_use]
    pub fn embedding(&self) -> Option<&EmbeddingVector> {
        self.embedding.as_ref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns `false` when the record was a near duplicate at insert time.
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns `true` when every actor in `owners` also owns this record.
    #[must_use]
    pub fn is_owned_by_all(&self, owners: &BTreeSet<ActorId>) -> bool {
        owners.is_subset(&self.owners)
    }

    /// Returns the record with the supplied embedding attached.
    #[must_use]
    pub fn with_embedding(mut self, embedding: EmbeddingVector) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Returns the record flagged as a near duplicate. Stores call this
    /// before inserting; records are never re-flagged after insertion.
    #[must_use]
    pub fn into_duplicate(mut self) -> Self {
        self.unique = false;
        self
    }
}

/// Builder type used to assemble [`MemoryRecord`] instances safely.
#[derive(Debug)]
pub struct MemoryRecordBuilder {
    id: MemoryId,
    owners: BTreeSet<ActorId>,
    author: Option<ActorId>,
    room_id: RoomId,
    content: Content,
    embedding: Option<EmbeddingVector>,
    created_at: DateTime<Utc>,
}

impl MemoryRecordBuilder {
    /// Overrides the record identifier.
    #[must_use]
    pub fn id(mut self, id: MemoryId) -> Self {
        self.id = id;
        self
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Adds an owner.
    #[must_use]
    pub fn owner(mut self, owner: ActorId) -> Self {
        self.owners.insert(owner);
        self
    }

    /// Adds multiple owners.
    #[must_use]
    pub fn owners<I>(mut self, owners: I) -> Self
    where
        I: IntoIterator<Item = ActorId>,
    {
        self.owners.extend(owners);
        self
    }

    /// Records who wrote the content.
    #[must_use]
    pub fn author(mut self, author: ActorId) -> Self {
        self.author = Some(author);
        self
    }

    /// Attaches an embedding to the record.
    #[must_use]
    pub fn embedding(mut self, embedding: EmbeddingVector) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Finalises the builder and produces the record.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRecord`] when the content carries neither
    /// text nor an action.
    pub fn build(self) -> MemoryResult<MemoryRecord> {
        if self.content.is_blank() && self.content.action.is_none() {
            return Err(MemoryError::InvalidRecord(
                "memory content requires text or an action",
            ));
        }
        Ok(MemoryRecord {
            id: self.id,
            owners: self.owners,
            author: self.author,
            room_id: self.room_id,
            content: self.content,
            embedding: self.embedding,
            created_at: self.created_at,
            unique: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_empty_content() {
        let err = MemoryRecord::builder(RoomId::random(), "")
            .build()
            .expect_err("empty content should fail");
        assert!(matches!(err, MemoryError::InvalidRecord(_)));
    }

    #[test]
    fn builder_constructs_record() {
        let alice = ActorId::random();
        let agent = ActorId::random();
        let record = MemoryRecord::builder(RoomId::random(), "hello")
            .owners([alice, agent])
            .build()
            .unwrap();

        assert_eq!(record.content().text, "hello");
        assert!(record.is_unique());
        assert!(record.embedding().is_none());
        assert!(record.is_owned_by_all(&BTreeSet::from([alice])));
        assert!(!record.is_owned_by_all(&BTreeSet::from([ActorId::random()])));
    }

    #[test]
    fn custom_domain_requires_label() {
        assert!(MemoryDomain::custom(" ").is_err());
        assert_eq!(MemoryDomain::custom("notes").unwrap().as_str(), "notes");
    }

    #[test]
    fn serialized_records_default_to_unique() {
        let record = MemoryRecord::builder(RoomId::random(), "hi")
            .owner(ActorId::random())
            .build()
            .unwrap();
        let mut value = serde_json::to_value(&record).unwrap();
        value.as_object_mut().unwrap().remove("unique");
        let decoded: MemoryRecord = serde_json::from_value(value).unwrap();
        assert!(decoded.is_unique());
    }
}
