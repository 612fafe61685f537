// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local ONNX sentence embeddings.
//!
//! The multilingual model runs on CPU with mean pooling and L2
//! normalization, so cosine similarity reduces to a dot product. The model
//! is loaded lazily on first indexing or first query; a load failure
//! surfaces `ModelUnavailable` without crashing the process.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use kiosk_core::KioskError;
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use tokio::sync::OnceCell;
use tracing::info;

/// ONNX embedder over `model.onnx` + `tokenizer.json` in one directory.
#[derive(Debug)]
pub struct Embedder {
    /// ONNX Runtime session (not Sync, serialized through the Mutex).
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

// Safety: the session is only touched under the Mutex; tokenizer encoding
// is thread-safe.
unsafe impl Send for Embedder {}
unsafe impl Sync for Embedder {}

impl Embedder {
    /// Load the model and tokenizer from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, KioskError> {
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            KioskError::ModelUnavailable(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let model_path = model_dir.join("model.onnx");
        let session = Session::builder()
            .map_err(|e| KioskError::ModelUnavailable(format!("onnx session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| KioskError::ModelUnavailable(format!("onnx optimization level: {e}")))?
            .with_intra_threads(1)
            .map_err(|e| KioskError::ModelUnavailable(format!("onnx thread count: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| {
                KioskError::ModelUnavailable(format!(
                    "failed to load model from {}: {e}",
                    model_path.display()
                ))
            })?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    /// Embed one text into an L2-normalized vector.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, KioskError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| KioskError::Internal(format!("tokenization failed: {e}")))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding
            .get_type_ids()
            .iter()
            .map(|&t| t as i64)
            .collect();
        let seq_len = input_ids.len();

        let to_tensor_err = |e: ndarray::ShapeError| {
            KioskError::Internal(format!("failed to shape input tensor: {e}"))
        };
        let input_ids_array = Array2::from_shape_vec((1, seq_len), input_ids).map_err(to_tensor_err)?;
        let attention_mask_array =
            Array2::from_shape_vec((1, seq_len), attention_mask.clone()).map_err(to_tensor_err)?;
        let token_type_ids_array =
            Array2::from_shape_vec((1, seq_len), token_type_ids).map_err(to_tensor_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| KioskError::Internal(format!("onnx session lock poisoned: {e}")))?;

        let to_ref_err = |e: ort::Error| {
            KioskError::Internal(format!("failed to build tensor ref: {e}"))
        };
        let input_ids_tensor = TensorRef::from_array_view(&input_ids_array).map_err(to_ref_err)?;
        let attention_mask_tensor =
            TensorRef::from_array_view(&attention_mask_array).map_err(to_ref_err)?;
        let token_type_ids_tensor =
            TensorRef::from_array_view(&token_type_ids_array).map_err(to_ref_err)?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            ])
            .map_err(|e| KioskError::Internal(format!("onnx inference failed: {e}")))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| KioskError::Internal(format!("failed to extract output tensor: {e}")))?;

        let hidden_size = shape[shape.len() - 1] as usize;
        let pooled = mean_pool_with_attention(data, &attention_mask, seq_len, hidden_size);
        Ok(l2_normalize(&pooled))
    }
}

/// Attention-masked mean pooling over token embeddings.
fn mean_pool_with_attention(
    embeddings: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_size];
    let mut count = 0.0f32;
    for i in 0..seq_len {
        if attention_mask[i] > 0 {
            for j in 0..hidden_size {
                sum[j] += embeddings[i * hidden_size + j];
            }
            count += 1.0;
        }
    }
    if count > 0.0 {
        for value in &mut sum {
            *value /= count;
        }
    }
    sum
}

/// L2-normalize a vector.
fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter().map(|v| v / norm).collect()
    } else {
        vec.to_vec()
    }
}

/// Cosine similarity of two L2-normalized vectors, clamped to [0, 1].
pub fn cosine_score(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot.clamp(0.0, 1.0)
}

/// Lazily-loaded embedder shared by indexing and querying.
///
/// The model directory is `<persist_dir>/models/<model name>` where the
/// model name is the part after the slash in the qualified
/// `EMBEDDING_MODEL` identifier.
pub struct LazyEmbedder {
    model_dir: PathBuf,
    inner: OnceCell<Arc<Embedder>>,
}

impl LazyEmbedder {
    pub fn new(persist_dir: &Path, embedding_model: &str) -> Self {
        let model_name = embedding_model
            .rsplit('/')
            .next()
            .unwrap_or(embedding_model);
        Self {
            model_dir: persist_dir.join("models").join(model_name),
            inner: OnceCell::new(),
        }
    }

    /// Directory the model files are expected in.
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Load the model on first use. A failed load is retried on the next
    /// call rather than being cached.
    pub async fn get(&self) -> Result<Arc<Embedder>, KioskError> {
        self.inner
            .get_or_try_init(|| async {
                let model_dir = self.model_dir.clone();
                let embedder = tokio::task::spawn_blocking(move || Embedder::load(&model_dir))
                    .await
                    .map_err(|e| KioskError::Internal(format!("embedder load task failed: {e}")))??;
                info!(model_dir = %self.model_dir.display(), "embedding model loaded");
                Ok(Arc::new(embedder))
            })
            .await
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_length() {
        let normalized = l2_normalize(&[3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector_is_untouched() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn mean_pool_honors_attention_mask() {
        // Two tokens, hidden size 2; the first token is padding.
        let embeddings = [9.0, 9.0, 1.0, 3.0];
        let pooled = mean_pool_with_attention(&embeddings, &[0, 1], 2, 2);
        assert_eq!(pooled, vec![1.0, 3.0]);
    }

    #[test]
    fn cosine_score_clamps_to_unit_interval() {
        assert!((cosine_score(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_score(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(cosine_score(&[1.0], &[1.0, 0.0]), 0.0, "dim mismatch scores zero");
    }

    #[tokio::test]
    async fn missing_model_surfaces_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let lazy = LazyEmbedder::new(dir.path(), "org/no-such-model");
        let err = lazy.get().await.unwrap_err();
        assert!(matches!(err, KioskError::ModelUnavailable(_)));
    }

    // Embedder::load with real weights is exercised in deployment; tests
    // cover the pure pooling and scoring math.
}
