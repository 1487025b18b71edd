/// ONNX Runtime embedder using the `ort` crate.
///
/// Runs all-MiniLM-L6-v2 on padded batches, applies attention-masked mean
/// pooling over the last hidden state, and L2-normalizes each row.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::tokenizer::BertTokenizer;
use super::{Embedder, EmbedderError, l2_normalize};

pub const MODEL_NAME: &str = "all-MiniLM-L6-v2";
pub const MODEL_DIMENSIONS: usize = 384;

/// Rows per inference call; larger inputs are split.
const INFERENCE_BATCH: usize = 32;

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn new(model_dir: &Path) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Initializing ONNX Runtime...");

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        let tokenizer = BertTokenizer::from_model_dir(model_dir)
            .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;

        info!(
            "Loaded {MODEL_NAME} (vocab size: {}, max length: {})",
            tokenizer.vocab_size(),
            tokenizer.max_length()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions: MODEL_DIMENSIONS,
        })
    }

    fn infer(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let batch = self
            .tokenizer
            .encode_batch(texts)
            .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;
        let shape = [batch.batch_size, batch.seq_len];

        let input_ids = Tensor::from_array((shape, batch.input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask = Tensor::from_array((shape, batch.attention_mask.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids = Tensor::from_array((shape, batch.token_type_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // [batch, seq_len, hidden]
        let (_shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let expected = batch.batch_size * batch.seq_len * self.dimensions;
        if hidden.len() != expected {
            return Err(EmbedderError::InferenceFailed(format!(
                "unexpected output size {} (expected {expected})",
                hidden.len()
            )));
        }

        Ok(mean_pooling(
            hidden,
            &batch.attention_mask,
            batch.batch_size,
            batch.seq_len,
            self.dimensions,
        ))
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.infer(&[text])?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("empty output".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for group in texts.chunks(INFERENCE_BATCH) {
            vectors.extend(self.infer(group)?);
        }
        debug!("Embedded {} texts", vectors.len());
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        MODEL_NAME
    }
}

/// Attention-masked mean over the sequence axis, one normalized vector per
/// row. `hidden` is flat with shape `[batch, seq_len, hidden_size]`.
fn mean_pooling(
    hidden: &[f32],
    attention_mask: &[i64],
    batch: usize,
    seq_len: usize,
    hidden_size: usize,
) -> Vec<Vec<f32>> {
    (0..batch)
        .map(|b| {
            let mut pooled = vec![0.0f32; hidden_size];
            let mut mask_sum = 0.0f32;
            for t in 0..seq_len {
                let mask = attention_mask[b * seq_len + t] as f32;
                if mask == 0.0 {
                    continue;
                }
                mask_sum += mask;
                let offset = (b * seq_len + t) * hidden_size;
                for (acc, v) in pooled.iter_mut().zip(&hidden[offset..offset + hidden_size]) {
                    *acc += v * mask;
                }
            }
            if mask_sum > 0.0 {
                for v in &mut pooled {
                    *v /= mask_sum;
                }
            }
            l2_normalize(&mut pooled);
            pooled
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pooling_simple() {
        let hidden = vec![3.0, 4.0];
        let mask = vec![1i64];
        let result = mean_pooling(&hidden, &mask, 1, 1, 2);
        assert_eq!(result, vec![vec![0.6, 0.8]]);
    }

    #[test]
    fn test_mean_pooling_ignores_padding() {
        // Two rows of two tokens, hidden size 2. Row 0 has one padding token.
        let hidden = vec![
            1.0, 0.0, 50.0, 50.0, // row 0
            0.0, 2.0, 0.0, 4.0, // row 1
        ];
        let mask = vec![1, 0, 1, 1];
        let result = mean_pooling(&hidden, &mask, 2, 2, 2);
        assert_eq!(result[0], vec![1.0, 0.0]);
        assert_eq!(result[1], vec![0.0, 1.0]);
    }

    #[test]
    #[ignore]
    fn test_onnx_embed_batch() {
        let model_dir = Path::new("models/all-MiniLM-L6-v2");
        if !model_dir.join("model.onnx").exists() {
            eprintln!("Skipping: model files not downloaded");
            return;
        }

        let embedder = OnnxEmbedder::new(model_dir).unwrap();
        let results = embedder
            .embed_batch(&["fn main() {}", "how to authenticate a user"])
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].len(), MODEL_DIMENSIONS);
        let norm: f32 = results[1].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01, "expected unit vector, got {norm}");
        assert_eq!(embedder.embed("fn main() {}").unwrap().len(), MODEL_DIMENSIONS);
    }
}
