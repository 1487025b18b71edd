/// Offline embedder for tests and model-less runs.
///
/// Feature hashing over lowercase word tokens: texts that share words end up
/// with a positive cosine similarity, which is enough for retrieval to behave
/// sensibly without an ONNX model on disk.
use super::{Embedder, EmbedderError, l2_normalize};

pub const MOCK_MODEL_NAME: &str = "mock-feature-hash";

pub struct MockEmbedder {
    pub dimensions: usize,
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let hash = blake3::hash(token.as_bytes());
        let bytes = hash.as_bytes();
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[..8]);
        let h = u64::from_le_bytes(word);
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        ((h % self.dimensions as u64) as usize, sign)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let lower = text.to_lowercase();
        let mut embedding = vec![0.0f32; self.dimensions];

        let mut seen_token = false;
        for token in lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let (idx, sign) = self.bucket(token);
            embedding[idx] += sign;
            seen_token = true;
        }
        if !seen_token {
            let (idx, sign) = self.bucket(&lower);
            embedding[idx] += sign;
        }

        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        MOCK_MODEL_NAME
    }
}
