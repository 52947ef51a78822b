use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::agent::extract_json_from_completion;
use crate::error::{SynthesisError, SynthesisResult};
use crate::inference::{complete_within, CompletionRequest, InferenceProvider};
use crate::prompts::SCORING_SYSTEM_PROMPT;

/// Scores a text against named criteria.
///
/// Implementations return whatever they produce; range and completeness are
/// checked by the synthesizer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, text: &str, criteria: &[String]) -> SynthesisResult<BTreeMap<String, i64>>;
}

/// Gives every criterion the same score. Useful offline and in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedScorer {
    score: i64,
}

impl FixedScorer {
    pub const DEFAULT_SCORE: i64 = 8;

    pub fn new(score: i64) -> Self {
        Self { score }
    }
}

impl Default for FixedScorer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SCORE)
    }
}

#[async_trait]
impl Scorer for FixedScorer {
    async fn score(&self, _text: &str, criteria: &[String]) -> SynthesisResult<BTreeMap<String, i64>> {
        Ok(criteria.iter().map(|c| (c.clone(), self.score)).collect())
    }
}

/// Asks the model for a JSON object of criterion scores
pub struct LlmScorer {
    inference: Arc<dyn InferenceProvider>,
    temperature: Option<f64>,
    call_timeout: Option<Duration>,
}

impl LlmScorer {
    pub fn new(inference: Arc<dyn InferenceProvider>) -> Self {
        Self {
            inference,
            temperature: Some(0.0),
            call_timeout: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    fn build_prompt(text: &str, criteria: &[String]) -> String {
        let listed: Vec<String> = criteria.iter().map(|c| format!("- {}", c)).collect();
        format!(
            "Criteria:\n{}\n\nText to score:\n{}",
            listed.join("\n"),
            text
        )
    }
}

#[async_trait]
impl Scorer for LlmScorer {
    async fn score(&self, text: &str, criteria: &[String]) -> SynthesisResult<BTreeMap<String, i64>> {
        let request = CompletionRequest::new(SCORING_SYSTEM_PROMPT, Self::build_prompt(text, criteria))
            .with_temperature(self.temperature);
        let completion = complete_within(self.inference.as_ref(), request, self.call_timeout).await?;
        debug!(completion_len = completion.len(), "Scoring completion received");
        parse_scores(&completion)
    }
}

/// Parse `{criterion: score}` from a completion.
///
/// Integral floats are accepted; anything else that is not an integer is an error.
pub fn parse_scores(completion: &str) -> SynthesisResult<BTreeMap<String, i64>> {
    let json = extract_json_from_completion(completion)
        .map_err(|message| SynthesisError::Scoring { message })?;

    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(json).map_err(|e| {
            warn!(error = %e, "Scoring response is not a JSON object");
            SynthesisError::Scoring {
                message: format!("Failed to parse scores: {}", e),
            }
        })?;

    raw.into_iter()
        .map(|(criterion, value)| {
            let score = value
                .as_i64()
                .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .ok_or_else(|| SynthesisError::Scoring {
                    message: format!("Score for {} is not an integer: {}", criterion, value),
                })?;
            Ok((criterion, score))
        })
        .collect()
}
