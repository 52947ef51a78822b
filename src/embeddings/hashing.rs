//! Local feature-hashing embedder
//!
//! Maps lowercase alphanumeric tokens into a fixed number of signed buckets
//! with XXH3 and L2-normalizes the result. Deterministic across runs and
//! platforms, so stored embeddings stay comparable without a model download.

use async_trait::async_trait;
use xxhash_rust::xxh3::xxh3_64;

use super::Embedder;
use crate::error::{EmbeddingError, EmbeddingResult};

/// Deterministic bag-of-words embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Synchronous embedding, also used by tests
    pub fn embed_text(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut tokens = 0usize;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = xxh3_64(token.to_lowercase().as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
            tokens += 1;
        }

        if tokens == 0 {
            return Err(EmbeddingError::EmptyInput);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.embed_text(text)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
