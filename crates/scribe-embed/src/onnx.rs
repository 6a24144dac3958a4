//! ONNX-based sentence embedding model.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use scribe_core::{Embedder, Result, ScribeError};

/// bge-large-en-v1.5 defaults.
const EMBEDDING_DIM: usize = 1024;
const MAX_SEQ_TOKENS: usize = 512;

/// Local sentence embedder backed by ONNX Runtime.
///
/// Inference is blocking and serialised behind a mutex; callers batch
/// their inputs and the pipeline bounds concurrency, so a single session
/// is sufficient.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Arc<Tokenizer>,
    dimension: usize,
    max_seq_tokens: usize,
    batch_size: usize,
}

impl OnnxEmbedder {
    /// Load the model and tokenizer from disk.
    pub fn new(model_path: impl AsRef<Path>, tokenizer_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(model_path, tokenizer_path, EMBEDDING_DIM, 16)
    }

    /// Load with an explicit dimension and inference batch size, for
    /// models other than the default.
    pub fn with_config(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        dimension: usize,
        batch_size: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        info!(model = %model_path.display(), "loading ONNX model");

        let session = Session::builder()
            .map_err(|e| ScribeError::embedding(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ScribeError::embedding(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| ScribeError::embedding(format!("Failed to set thread count: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| ScribeError::embedding(format!("Failed to load model: {e}")))?;

        info!(tokenizer = %tokenizer_path.display(), "loading tokenizer");

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| ScribeError::embedding(format!("Failed to load tokenizer: {e}")))?;

        info!(dimension, batch_size, "embedder initialized");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            dimension,
            max_seq_tokens: MAX_SEQ_TOKENS,
            batch_size: batch_size.max(1),
        })
    }

    /// Run one inference batch through the model.
    fn run_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| ScribeError::embedding(format!("Tokenization failed: {e}")))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_seq_tokens);

        let batch_size = encodings.len();

        debug!(batch_size, max_len, "embedding batch");

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let row = i * max_len;

            for (j, (&id, &m)) in ids.iter().zip(mask).take(max_len).enumerate() {
                input_ids[row + j] = id as i64;
                attention_mask[row + j] = m as i64;
            }
        }

        let input_ids_tensor = Tensor::from_array((vec![batch_size, max_len], input_ids))
            .map_err(|e| ScribeError::embedding(format!("Failed to create input tensor: {e}")))?;

        let attention_mask_tensor = Tensor::from_array((vec![batch_size, max_len], attention_mask))
            .map_err(|e| ScribeError::embedding(format!("Failed to create mask tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ScribeError::embedding(format!("Failed to lock session: {e}")))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
            .map_err(|e| ScribeError::embedding(format!("Inference failed: {e}")))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| ScribeError::embedding("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| ScribeError::embedding(format!("Failed to extract tensor: {e}")))?;

        let shape: Vec<usize> = view.shape().to_vec();

        // Token-level output needs mean pooling; some exports pool already.
        let embeddings = if shape.len() == 3 {
            self.mean_pool(&view, &encodings, max_len)?
        } else if shape.len() == 2 {
            let hidden_dim = shape[1];
            (0..batch_size)
                .map(|i| {
                    let v: Vec<f32> = (0..hidden_dim).map(|j| view[[i, j]]).collect();
                    l2_normalize(v)
                })
                .collect()
        } else {
            return Err(ScribeError::embedding(format!(
                "Unexpected output shape: {shape:?}"
            )));
        };

        Ok(embeddings)
    }

    /// Attention-masked mean pooling over `[batch, seq, hidden]`.
    fn mean_pool(
        &self,
        tensor: &ArrayViewD<'_, f32>,
        encodings: &[tokenizers::Encoding],
        max_len: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let shape = tensor.shape();
        let seq_len = shape[1];
        let hidden_dim = shape[2];

        let mut embeddings = Vec::with_capacity(encodings.len());

        for (i, encoding) in encodings.iter().enumerate() {
            let mask = encoding.get_attention_mask();
            let valid_len = mask.iter().take(max_len).filter(|&&m| m == 1).count();

            if valid_len == 0 {
                embeddings.push(vec![0.0; hidden_dim]);
                continue;
            }

            let mut sum = vec![0.0f32; hidden_dim];
            for j in 0..valid_len.min(seq_len) {
                if mask.get(j).copied() == Some(1) {
                    for k in 0..hidden_dim {
                        sum[k] += tensor[[i, j, k]];
                    }
                }
            }

            let mean: Vec<f32> = sum.iter().map(|s| s / valid_len as f32).collect();
            embeddings.push(l2_normalize(mean));
        }

        Ok(embeddings)
    }
}

/// L2 normalize a vector in place.
pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());
        for window in texts.chunks(self.batch_size) {
            all.extend(self.run_batch(window)?);
        }
        Ok(all)
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

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let v = l2_normalize(vec![0.0, 0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
