//! The inference seam: anything that turns a system prompt and a user prompt into text.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, InferenceResult};

/// A single completion call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl CompletionRequest {
    /// Create a request without a temperature override
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: None,
        }
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Language-model backend used by agent sessions, the synthesizer and the scorer.
///
/// Implementations may block on I/O; they are never retried by the callers in
/// this crate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Produce a completion for the request
    async fn complete(&self, request: CompletionRequest) -> InferenceResult<String>;

    /// Identifier of the model answering the calls, recorded in analysis output
    fn model(&self) -> &str;
}

/// Run one completion, failing with [`InferenceError::Timeout`] when `limit` elapses first.
pub async fn complete_within(
    provider: &dyn InferenceProvider,
    request: CompletionRequest,
    limit: Option<Duration>,
) -> InferenceResult<String> {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout {
                timeout_ms: limit.as_millis() as u64,
            }),
        },
        None => provider.complete(request).await,
    }
}
