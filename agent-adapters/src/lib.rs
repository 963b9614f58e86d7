//! Model and embedding adapters used by persona agents.
//!
//! Providers implement the traits in [`traits`]; the runtime only ever talks
//! to a backend through [`traits::ModelAdapter`] and [`traits::EmbeddingAdapter`].

#![warn(missing_docs, clippy::pedantic)]

pub mod openai;
pub mod traits;

mod http_client;
