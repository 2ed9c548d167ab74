//! Retrieval module - similarity search over the indexed document
//!
//! The index is built by an external ingestion step, loaded once at startup,
//! and shared read-only between threads.

pub mod lexical;

use async_trait::async_trait;

use crate::core::{Document, Result};

pub use lexical::LexicalIndex;

/// Ranked similarity search over the document corpus
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// Return up to `k` documents, best match first.
    ///
    /// Scores are not comparable across queries.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>>;
}
