//! VectorStore trait: abstract interface for the chunk index.
//!
//! The serving path only reads; ingestion writes. The primary
//! implementation is `SqliteVectorStore` in the `sqlite` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::BotError;

/// An indexed passage of source text plus its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier derived from source and offset.
    pub id: String,
    /// The passage text, never empty and never longer than the chunk size.
    pub text: String,
    /// Origin document identifier (path, URL, or caller-supplied name).
    pub source_ref: String,
    /// Position of this chunk within its source.
    pub sequence_index: usize,
    /// Character offset of the window start within the source text.
    pub start_offset: usize,
    /// Present once the chunk has been embedded for indexing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// One retrieval hit: a chunk and its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ranked retrieval output, descending by score.
pub type RetrievalResult = Vec<ScoredChunk>;

/// Sort hits by descending score; ties break by ascending sequence index,
/// then source, so identical inputs always rank identically.
pub fn rank_results(results: &mut [ScoredChunk]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
            .then_with(|| a.chunk.source_ref.cmp(&b.chunk.source_ref))
    });
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or fully overwrite chunks by id. Every chunk must carry an
    /// embedding.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<(), BotError>;

    /// Nearest-neighbor lookup; returns at most `top_k` ranked hits.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<RetrievalResult, BotError>;

    /// Remove every chunk belonging to a source. Returns the removed count.
    async fn delete_by_source(&self, source_ref: &str) -> Result<usize, BotError>;

    /// Atomically swap a source's chunks: delete + insert in one
    /// transaction, so a concurrent query never observes a half-replaced
    /// source. This is what makes re-ingestion idempotent.
    async fn replace_source(&self, source_ref: &str, chunks: &[Chunk]) -> Result<(), BotError>;

    /// Total indexed chunks.
    async fn count(&self) -> Result<usize, BotError>;

    /// Remove everything.
    async fn clear(&self) -> Result<usize, BotError>;
}
