//! Deterministic feature-hashing embedder.
//!
//! Each whitespace token is hashed into a fixed-dimension bucket and the
//! resulting count vector is L2-normalized. No model weights, no network,
//! no GPU; two identical texts always embed identically, which is what
//! the idempotency and fusion tests rely on. Texts sharing vocabulary
//! land near each other under cosine similarity, so the ranking behaviour
//! is meaningful even without a learned model.

use async_trait::async_trait;

use scribe_core::{Embedder, Result};

use crate::onnx::l2_normalize;

/// Feature-hashing embedder used when no ONNX model is configured.
pub struct HashedEmbedder {
    dimension: usize,
    batch_size: usize,
}

impl HashedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            batch_size: 64,
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];

        for token in text.split_whitespace() {
            let lowered = token.to_lowercase();
            let digest = blake3::hash(lowered.as_bytes());
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&digest.as_bytes()[..8]);
            let bucket = (u64::from_le_bytes(raw) % self.dimension as u64) as usize;
            v[bucket] += 1.0;
        }

        l2_normalize(v)
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = HashedEmbedder::new(64);

        let a = embedder.embed_query("persistent dry cough").await.unwrap();
        let b = embedder.embed_query("persistent dry cough").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_unit_normalized() {
        let embedder = HashedEmbedder::new(64);

        let v = embedder.embed_query("mold exposure history").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = HashedEmbedder::new(16);

        let v = embedder.embed_query("").await.unwrap();
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_shared_vocabulary_scores_higher() {
        let embedder = HashedEmbedder::new(256);

        let q = embedder.embed_query("mycotoxin exposure").await.unwrap();
        let near = embedder
            .embed_query("mycotoxin exposure in water damaged building")
            .await
            .unwrap();
        let far = embedder
            .embed_query("quarterly revenue projections")
            .await
            .unwrap();

        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(dot(&q, &near) > dot(&q, &far));
    }

    #[tokio::test]
    async fn test_batch_embeds_every_text() {
        let embedder = HashedEmbedder::new(32);

        let vectors = embedder.embed(&["one", "two", "three"]).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 32));
    }
}
