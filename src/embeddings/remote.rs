//! Remote embedder for OpenAI/Voyage-compatible `/embeddings` endpoints

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::Embedder;
use crate::error::{EmbeddingError, EmbeddingResult};

/// Request timeout duration
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Embedder backed by an HTTP embeddings API
pub struct RemoteEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl RemoteEmbedder {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        dimensions: usize,
    ) -> EmbeddingResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            dimensions,
        })
    }

    fn validate_embedding(&self, embedding: &[f32]) -> EmbeddingResult<()> {
        if embedding.len() != self.dimensions {
            return Err(EmbeddingError::InvalidResponse {
                message: format!(
                    "Expected {} dimensions, got {}",
                    self.dimensions,
                    embedding.len()
                ),
            });
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(EmbeddingError::InvalidResponse {
                message: "Embedding contains invalid values (NaN or Inf)".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        debug!(model = %self.model, chars = text.len(), "Requesting embedding");

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&EmbeddingRequest {
                input: vec![text],
                model: &self.model,
            })
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        let embedding = body
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse {
                message: "Empty response from API".to_string(),
            })?
            .embedding;

        self.validate_embedding(&embedding)?;
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
