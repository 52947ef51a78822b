//! Embedding generation for the document store
//!
//! Provides a deterministic local feature-hashing embedder and a remote
//! embedder for OpenAI/Voyage-compatible `/embeddings` endpoints.

mod hashing;
mod remote;

pub use hashing::HashingEmbedder;
pub use remote::RemoteEmbedder;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{EmbeddingError, EmbeddingResult};

/// Text → vector function used at insertion and query time
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate the embedding for one text
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Embedding dimensionality
    fn dimensions(&self) -> usize;
}

/// Build the embedder selected in configuration
pub fn from_config(config: &EmbeddingConfig) -> EmbeddingResult<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimensions))),
        EmbeddingProvider::Remote => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| EmbeddingError::InvalidResponse {
                    message: "remote embedder requires an API key".to_string(),
                })?;
            Ok(Arc::new(RemoteEmbedder::new(
                api_key,
                config.model.clone(),
                config.base_url.clone(),
                config.dimensions,
            )?))
        }
    }
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Cosine distance in [0, 2]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let vec1 = vec![1.0, 0.0, 0.0];
        let vec2 = vec![1.0, 0.0, 0.0];
        let vec3 = vec![0.0, 1.0, 0.0];

        assert!((cosine_similarity(&vec1, &vec2) - 1.0).abs() < 0.01);
        assert!((cosine_similarity(&vec1, &vec3) - 0.0).abs() < 0.01);
    }

    #[test]
    fn test_cosine_similarity_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_cosine_distance_bounds() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert!((cosine_distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_config_remote_requires_key() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Remote,
            api_key: None,
            base_url: "http://localhost".to_string(),
            model: "m".to_string(),
            dimensions: 8,
        };
        assert!(from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_hashing() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Hashing,
            api_key: None,
            base_url: String::new(),
            model: String::new(),
            dimensions: 16,
        };
        let embedder = from_config(&config).unwrap();
        assert_eq!(embedder.dimensions(), 16);
    }
}
