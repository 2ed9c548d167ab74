//! In-memory BM25 index over a JSON corpus of document chunks

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;

use crate::core::{DocentError, Document, Result};
use crate::retrieval::RetrievalIndex;

const K1: f32 = 1.2;
const B: f32 = 0.75;

struct IndexedChunk {
    document: Document,
    term_counts: HashMap<String, usize>,
    len: usize,
}

/// Immutable lexical index. Load once, share behind an `Arc`.
pub struct LexicalIndex {
    chunks: Vec<IndexedChunk>,
    doc_freq: HashMap<String, usize>,
    avg_len: f32,
}

impl LexicalIndex {
    /// Build an index from already chunked documents
    pub fn from_documents(documents: Vec<Document>) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let chunks: Vec<IndexedChunk> = documents
            .into_iter()
            .map(|document| {
                let tokens = tokenize(&document.content);
                let mut term_counts: HashMap<String, usize> = HashMap::new();
                for token in &tokens {
                    *term_counts.entry(token.clone()).or_default() += 1;
                }
                for term in term_counts.keys() {
                    *doc_freq.entry(term.clone()).or_default() += 1;
                }
                IndexedChunk {
                    document,
                    term_counts,
                    len: tokens.len(),
                }
            })
            .collect();

        let avg_len = if chunks.is_empty() {
            0.0
        } else {
            chunks.iter().map(|c| c.len as f32).sum::<f32>() / chunks.len() as f32
        };

        Self {
            chunks,
            doc_freq,
            avg_len,
        }
    }

    /// Load a corpus file: a JSON array of `{content, page, source_id}` records
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DocentError::IndexNotFound(path.to_path_buf()));
        }

        let raw = fs::read_to_string(path)?;
        let documents: Vec<Document> = serde_json::from_str(&raw).map_err(|e| {
            DocentError::config(format!("Failed to parse index {}: {}", path.display(), e))
        })?;

        if documents.is_empty() {
            return Err(DocentError::config(format!(
                "Index {} contains no documents",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), chunks = documents.len(), "loaded document index");
        Ok(Self::from_documents(documents))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.chunks.len() as f32;
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score(&self, query: &[String], chunk: &IndexedChunk) -> f32 {
        if chunk.len == 0 {
            return 0.0;
        }
        let len_norm = if self.avg_len > 0.0 {
            chunk.len as f32 / self.avg_len
        } else {
            1.0
        };

        query
            .iter()
            .map(|term| {
                let tf = *chunk.term_counts.get(term).unwrap_or(&0) as f32;
                if tf == 0.0 {
                    return 0.0;
                }
                self.idf(term) * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * len_norm))
            })
            .sum()
    }

    /// Synchronous search used by the trait implementation
    pub fn search(&self, query: &str, k: usize) -> Vec<Document> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();

        let mut scored: Vec<(f32, usize)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (self.score(&terms, chunk), i))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        // Stable on ties: earlier chunks first.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        scored
            .into_iter()
            .take(k)
            .map(|(_, i)| self.chunks[i].document.clone())
            .collect()
    }
}

#[async_trait]
impl RetrievalIndex for LexicalIndex {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        Ok(self.search(query, k))
    }
}

fn tokenize(input: &str) -> Vec<String> {
    input
        .to_lowercase()
        .replace('\'', "")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}
