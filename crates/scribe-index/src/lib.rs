//! scribe-index - SQLite index store
//!
//! One on-disk database holds the three structures that share the
//! `chunk_id` join key: the FTS5 inverted index over chunk text (BM25
//! scoring), the dense vector table searched by cosine similarity, and
//! the resumability ledger keyed by content fingerprint.

mod schema;
mod sqlite;

pub use sqlite::SqliteIndex;

// Re-export schema for testing/migrations
pub use schema::{SCHEMA, SCHEMA_VERSION};
