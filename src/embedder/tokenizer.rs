/// BERT tokenizer wrapper around HuggingFace `tokenizers` crate.
use std::path::Path;

use anyhow::Result;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// all-MiniLM-L6-v2 was trained on sequences of at most 256 word pieces.
pub const MAX_SEQUENCE_LENGTH: usize = 256;

pub struct BertTokenizer {
    inner: Tokenizer,
    max_length: usize,
}

/// A batch padded to a common sequence length, flattened row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    pub batch_size: usize,
    pub seq_len: usize,
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl BertTokenizer {
    /// Load `tokenizer.json` from the model directory.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {}",
            model_dir.display()
        );

        let inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        Self::from_tokenizer(inner, MAX_SEQUENCE_LENGTH)
    }

    pub fn from_tokenizer(mut inner: Tokenizer, max_length: usize) -> Result<Self> {
        inner
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("invalid truncation settings: {e}"))?;

        inner.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self { inner, max_length })
    }

    /// Encode texts into one padded batch.
    pub fn encode_batch(&self, texts: &[&str]) -> Result<EncodedBatch> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("failed to encode batch: {e}"))?;

        let seq_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
        let mut batch = EncodedBatch {
            batch_size: encodings.len(),
            seq_len,
            input_ids: Vec::with_capacity(encodings.len() * seq_len),
            attention_mask: Vec::with_capacity(encodings.len() * seq_len),
            token_type_ids: Vec::with_capacity(encodings.len() * seq_len),
        };

        for enc in &encodings {
            let pad = seq_len - enc.len();
            batch
                .input_ids
                .extend(enc.get_ids().iter().map(|&id| i64::from(id)));
            batch
                .attention_mask
                .extend(enc.get_attention_mask().iter().map(|&m| i64::from(m)));
            batch
                .token_type_ids
                .extend(enc.get_type_ids().iter().map(|&t| i64::from(t)));
            batch.input_ids.extend(std::iter::repeat_n(0, pad));
            batch.attention_mask.extend(std::iter::repeat_n(0, pad));
            batch.token_type_ids.extend(std::iter::repeat_n(0, pad));
        }

        Ok(batch)
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }

    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run with: cargo test tokenizer -- --ignored
    #[test]
    #[ignore]
    fn test_encode_batch_with_real_model() {
        let model_dir = Path::new("models/all-MiniLM-L6-v2");
        if !model_dir.join("tokenizer.json").exists() {
            eprintln!("Skipping: model files not downloaded");
            return;
        }

        let tokenizer = BertTokenizer::from_model_dir(model_dir).unwrap();
        let batch = tokenizer
            .encode_batch(&["Hello", "a much longer second input sentence"])
            .unwrap();

        assert_eq!(batch.batch_size, 2);
        assert_eq!(batch.input_ids.len(), 2 * batch.seq_len);
        assert_eq!(batch.attention_mask.len(), batch.input_ids.len());
        // First row is padded.
        assert_eq!(batch.attention_mask[batch.seq_len - 1], 0);
        assert!(batch.seq_len <= MAX_SEQUENCE_LENGTH);
    }

    #[test]
    fn test_tokenizer_missing_file() {
        let result = BertTokenizer::from_model_dir(Path::new("/nonexistent/path"));
        assert!(result.is_err());
    }
}
