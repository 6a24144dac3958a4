//! Core traits defining the seams between components.
//!
//! The embedding model and the index store are long-lived handles passed
//! into the pipeline and query engine at construction, never process-wide
//! singletons.

use async_trait::async_trait;
use ulid::Ulid;

use crate::error::Result;
use crate::types::{Chunk, IndexStats, LedgerEntry, SearchHit};

/// Embedding provider.
///
/// Implementations must return one unit-normalized vector per input text,
/// all of the same fixed dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| crate::error::ScribeError::embedding("empty embedding batch"))
    }

    /// Fixed embedding dimension.
    fn dimension(&self) -> usize;

    /// Preferred batch size for model inference.
    fn batch_size(&self) -> usize {
        16
    }
}

/// Combined index store: lexical inverted index, dense vector table and
/// the resumability ledger, all joined on `chunk_id`.
#[async_trait]
pub trait ChunkIndex: Send + Sync {
    /// Upsert chunk documents by `chunk_id`. A resubmission with the same
    /// id overwrites the prior document rather than duplicating it.
    /// The whole batch commits atomically. Returns the number upserted.
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<usize>;

    /// Record the vector collection dimension, creating it on first use.
    /// Duplicate creation attempts are tolerated; a conflicting dimension
    /// is fatal (`ScribeError::DimensionMismatch`).
    async fn ensure_dimension(&self, dimension: usize) -> Result<()>;

    /// Upsert one vector per chunk id, replacing any prior vector for
    /// that id. Order-independent and safe under racing retries.
    async fn upsert_embeddings(&self, entries: &[(Ulid, Vec<f32>)]) -> Result<()>;

    /// Nearest-neighbour search over the vector table by cosine
    /// similarity. An empty table yields an empty ranking.
    async fn vector_search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>>;

    /// BM25-scored search against the indexed text field only. A missing
    /// or empty index yields an empty ranking, never an error.
    async fn lexical_search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>>;

    /// Look up a content fingerprint in the resumability ledger.
    async fn ledger_lookup(&self, fingerprint: &str) -> Result<Option<LedgerEntry>>;

    /// Record a fully-processed input. Must only be called after the
    /// whole unit of work succeeded; a crash beforehand leaves no entry.
    async fn ledger_record(&self, fingerprint: &str, entry: &LedgerEntry) -> Result<()>;

    /// Counters over the store.
    async fn stats(&self) -> Result<IndexStats>;
}
