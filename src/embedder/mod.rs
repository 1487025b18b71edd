/// Embedder trait and shared types for text embedding.
pub mod download;
pub mod mock;
pub mod onnx;
pub mod tokenizer;

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),
}

/// Text → fixed-length vector.
///
/// Implementations are deterministic for a given model and must be
/// `Send + Sync` so one instance can be shared behind `Arc` between the
/// indexing and query paths. Calls may block; async callers run them on
/// the blocking pool.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    /// Identifier of the model, recorded with each collection.
    fn model_name(&self) -> &str;
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub(crate) fn l2_normalize(vec: &mut [f32]) {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return;
    }
    let inv = 1.0 / norm_sq.sqrt();
    for v in vec {
        *v *= inv;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
