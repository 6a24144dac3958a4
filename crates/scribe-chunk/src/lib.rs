//! scribe-chunk - Chunk Builder
//!
//! Groups ordered validated transcript segments into bounded,
//! overlap-preserving chunks. Chunking is a pure function over memory:
//! no IO, no side effects.
//!
//! # Example
//!
//! ```rust
//! use scribe_chunk::build_chunks;
//! use scribe_core::{ChunkingConfig, Segment};
//!
//! let segments = vec![Segment {
//!     start_time: 0.0,
//!     end_time: 2.5,
//!     speaker: "clinician".into(),
//!     text: "how long has the cough persisted".into(),
//!     confidence_medical: 0.95,
//!     confidence_contextual: 0.9,
//! }];
//! let chunks = build_chunks(&segments, Some("visit-1"), &ChunkingConfig::default());
//! assert_eq!(chunks.len(), 1);
//! ```

mod builder;

pub use builder::build_chunks;

// Re-export types for convenience
pub use scribe_core::{Chunk, ChunkingConfig, Segment};
