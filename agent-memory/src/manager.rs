//! Domain-bound memory manager that embeds content before it is stored.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use agent_primitives::{ActorId, MemoryId};
use tracing::debug;

use crate::embeddings::{Embedder, EmbeddingVector};
use crate::record::{MemoryDomain, MemoryRecord};
use crate::store::{AppendOutcome, MemoryMatch, MemoryStore, SearchOptions};
use crate::{MemoryError, MemoryResult};

/// Binds a [`MemoryDomain`] to a store and an embedder.
///
/// Several managers usually share one store, each addressing its own domain.
#[derive(Clone)]
pub struct MemoryManager {
    domain: MemoryDomain,
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
}

impl fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryManager")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl MemoryManager {
    /// Creates a builder for the supplied domain.
    #[must_use]
    pub fn builder(domain: MemoryDomain) -> MemoryManagerBuilder {
        MemoryManagerBuilder {
            domain,
            store: None,
            embedder: None,
        }
    }

    /// Returns the domain this manager writes to.
    #[must_use]
    pub fn domain(&self) -> &MemoryDomain {
        &self.domain
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn MemoryStore> {
        Arc::clone(&self.store)
    }

    /// Ensures the record carries an embedding, computing one from its text when absent.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::EmptyContent`] when an embedding is needed but
    /// the record has no text, or any error raised by the embedder.
    pub async fn attach_embedding(&self, record: MemoryRecord) -> MemoryResult<MemoryRecord> {
        if record.embedding().is_some() {
            return Ok(record);
        }
        if record.content().is_blank() {
            return Err(MemoryError::EmptyContent);
        }
        let embedding = self.embedder.embed(&record.content().text).await?;
        Ok(record.with_embedding(embedding))
    }

    /// Embeds (when needed) and appends a record.
    ///
    /// # Errors
    ///
    /// Propagates embedding and storage failures.
    pub async fn create_memory(
        &self,
        record: MemoryRecord,
        dedupe: bool,
    ) -> MemoryResult<AppendOutcome> {
        let record = self.attach_embedding(record).await?;
        let id = record.id();
        let outcome = self.store.append(&self.domain, record, dedupe).await?;
        debug!(domain = %self.domain, memory_id = %id, ?outcome, "memory appended");
        Ok(outcome)
    }

    /// Returns at most `limit` records for the owner set, newest first.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn get_recent(
        &self,
        owners: &BTreeSet<ActorId>,
        limit: usize,
        unique_only: bool,
    ) -> MemoryResult<Vec<MemoryRecord>> {
        self.store
            .get_recent(&self.domain, owners, limit, unique_only)
            .await
    }

    /// Similarity search with a precomputed embedding.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn search_by_embedding(
        &self,
        embedding: &EmbeddingVector,
        options: &SearchOptions,
    ) -> MemoryResult<Vec<MemoryMatch>> {
        self.store
            .search_by_similarity(&self.domain, embedding, options)
            .await
    }

    /// Embeds `text` and runs a similarity search with it.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::EmptyContent`] for blank queries and propagates
    /// embedding and storage failures.
    pub async fn search_by_text(
        &self,
        text: &str,
        options: &SearchOptions,
    ) -> MemoryResult<Vec<MemoryMatch>> {
        if text.trim().is_empty() {
            return Err(MemoryError::EmptyContent);
        }
        let embedding = self.embedder.embed(text).await?;
        self.search_by_embedding(&embedding, options).await
    }

    /// Counts records for the owner set.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn count_by_owners(
        &self,
        owners: &BTreeSet<ActorId>,
        unique_only: bool,
    ) -> MemoryResult<usize> {
        self.store
            .count_by_owners(&self.domain, owners, unique_only)
            .await
    }

    /// Removes every record for the owner set.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn remove_by_owners(&self, owners: &BTreeSet<ActorId>) -> MemoryResult<usize> {
        self.store.remove_by_owners(&self.domain, owners).await
    }

    /// Removes a single record.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn remove_one(&self, id: MemoryId) -> MemoryResult<bool> {
        self.store.remove_one(&self.domain, id).await
    }
}

/// Builder for [`MemoryManager`].
pub struct MemoryManagerBuilder {
    domain: MemoryDomain,
    store: Option<Arc<dyn MemoryStore>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl MemoryManagerBuilder {
    /// Sets the backing store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the embedder.
    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Builds the manager.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::MissingStore`] or [`MemoryError::MissingEmbedder`]
    /// when a collaborator was not supplied.
    pub fn build(self) -> MemoryResult<MemoryManager> {
        Ok(MemoryManager {
            domain: self.domain,
            store: self.store.ok_or(MemoryError::MissingStore)?,
            embedder: self.embedder.ok_or(MemoryError::MissingEmbedder)?,
        })
    }
}
