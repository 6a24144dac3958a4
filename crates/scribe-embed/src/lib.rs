//! scribe-embed - Embedding providers
//!
//! Two implementations of the [`scribe_core::Embedder`] trait:
//!
//! - [`OnnxEmbedder`]: a transformer sentence-embedding model run locally
//!   via ONNX Runtime (mean pooling + L2 normalization).
//! - [`HashedEmbedder`]: a deterministic feature-hashing embedder used
//!   when no model is configured and throughout the test suites.
//!
//! Both produce unit-normalized vectors of a fixed dimension, which is
//! what the vector index and the cosine-similarity search assume.

mod hashed;
mod onnx;

pub use hashed::HashedEmbedder;
pub use onnx::OnnxEmbedder;

pub use scribe_core::Embedder;
