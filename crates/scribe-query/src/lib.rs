//! scribe-query - Hybrid search engine
//!
//! Runs the lexical and vector legs concurrently and fuses their
//! rankings with weighted Reciprocal Rank Fusion (RRF). RRF is used
//! instead of any raw-score blend because cosine similarity and BM25
//! live on incomparable scales.

mod engine;
mod fusion;

pub use engine::QueryEngine;
pub use fusion::{fuse, rrf_scores, DEFAULT_RRF_K};

// Re-export for convenience
pub use scribe_core::{SearchHit, SearchMode, SearchResponse};
