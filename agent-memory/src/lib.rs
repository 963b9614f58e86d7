//! Memory stores for persona agents.
//!
//! A [`MemoryStore`] holds append-mostly logs of [`MemoryRecord`]s partitioned
//! by [`MemoryDomain`]. A [`MemoryManager`] binds one domain to a store and an
//! [`Embedder`] so that callers never insert text without its embedding.

#![warn(missing_docs, clippy::pedantic)]

pub mod embeddings;
pub mod error;
pub mod local;
pub mod manager;
pub mod record;
pub mod store;

pub use embeddings::{Embedder, EmbeddingVector, cosine_similarity};
pub use error::{MemoryError, MemoryResult};
pub use local::LocalMemoryStore;
pub use manager::{MemoryManager, MemoryManagerBuilder};
pub use record::{MemoryDomain, MemoryRecord, MemoryRecordBuilder};
pub use store::{
    AppendOutcome, DEFAULT_MATCH_COUNT, DEFAULT_MATCH_THRESHOLD, DUPLICATE_THRESHOLD, MemoryMatch,
    MemoryStore, SearchOptions,
};
