//! scribe-pipeline - Batch ingestion of validated transcripts
//!
//! The pipeline turns validated segment files into indexed, searchable
//! chunks: fingerprint the input, consult the resumability ledger, build
//! chunks, persist the chunk artifact, upsert the lexical documents and
//! dense vectors, and only then record the ledger entry. A crash mid-file
//! leaves no ledger entry, so a retry redoes the whole unit of work.

mod ingest;
mod rebuild;
mod status;

pub use ingest::{embed_and_upsert, Pipeline};
pub use rebuild::rebuild_index;
pub use status::{StatusEvent, StatusSink};
