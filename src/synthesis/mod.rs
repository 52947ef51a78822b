//! Multi-perspective review synthesis.
//!
//! [`ReviewSynthesizer`] merges the terminal review of every required
//! perspective into one text, extracts its recommendations, scores it against
//! the configured criteria and decides whether it needs revision.

mod scoring;

pub use scoring::*;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use minijinja::{Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{SynthesisError, SynthesisResult};
use crate::inference::{complete_within, CompletionRequest, InferenceProvider};

/// Marker that opens the recommendation section of a synthesis
pub const RECOMMENDATIONS_MARKER: &str = "Recommendations:";

/// A terminal review tagged with the perspective it was written from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub perspective: String,
    pub text: String,
}

impl Review {
    pub fn new(perspective: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            perspective: perspective.into(),
            text: text.into(),
        }
    }
}

/// Outcome bucket selected from the average score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTier {
    RevisionNeeded,
    MinorImprovements,
    Approval,
}

impl FeedbackTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackTier::RevisionNeeded => "revision_needed",
            FeedbackTier::MinorImprovements => "minor_improvements",
            FeedbackTier::Approval => "approval",
        }
    }
}

impl fmt::Display for FeedbackTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Score boundaries: below `revision_required` the synthesis must be revised,
/// below `minor_improvements` it passes with remarks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub revision_required: f64,
    pub minor_improvements: f64,
}

impl QualityThresholds {
    pub fn new(revision_required: f64, minor_improvements: f64) -> Result<Self, String> {
        let thresholds = Self {
            revision_required,
            minor_improvements,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.revision_required.is_finite() || !self.minor_improvements.is_finite() {
            return Err("quality thresholds must be finite".to_string());
        }
        if self.revision_required > self.minor_improvements {
            return Err(format!(
                "revision_required ({}) must not exceed minor_improvements ({})",
                self.revision_required, self.minor_improvements
            ));
        }
        Ok(())
    }

    pub fn tier(&self, average: f64) -> FeedbackTier {
        if average < self.revision_required {
            FeedbackTier::RevisionNeeded
        } else if average < self.minor_improvements {
            FeedbackTier::MinorImprovements
        } else {
            FeedbackTier::Approval
        }
    }

    pub fn requires_revision(&self, average: f64) -> bool {
        average < self.revision_required
    }
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            revision_required: 6.0,
            minor_improvements: 8.0,
        }
    }
}

/// Feedback text attached to each tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackTemplates {
    pub revision_needed: String,
    pub minor_improvements: String,
    pub approval: String,
}

impl FeedbackTemplates {
    pub fn for_tier(&self, tier: FeedbackTier) -> &str {
        match tier {
            FeedbackTier::RevisionNeeded => &self.revision_needed,
            FeedbackTier::MinorImprovements => &self.minor_improvements,
            FeedbackTier::Approval => &self.approval,
        }
    }
}

/// Review settings of a panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    pub system_prompt: String,
    /// minijinja template; every required perspective is bound by name
    pub synthesis_template: String,
    pub criteria: Vec<String>,
    pub quality_thresholds: QualityThresholds,
    pub feedback_templates: FeedbackTemplates,
    pub required_perspectives: BTreeSet<String>,
}

impl ReviewConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.criteria.is_empty() {
            return Err("review defines no scoring criteria".to_string());
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.criteria.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(format!("criterion '{}' is listed twice", dup));
        }
        self.quality_thresholds.validate()?;
        if self.required_perspectives.is_empty() {
            return Err("review requires no perspectives".to_string());
        }
        Environment::new()
            .template_from_str(&self.synthesis_template)
            .map_err(|e| format!("synthesis template does not compile: {}", e))?;
        Ok(())
    }
}

/// Result of one synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub synthesis: String,
    pub recommendations: Vec<String>,
    pub scores: BTreeMap<String, i64>,
    pub average_score: f64,
    pub feedback_tier: FeedbackTier,
    pub feedback_template: String,
    pub requires_revision: bool,
    /// Review text used for each perspective
    pub perspectives: BTreeMap<String, String>,
}

/// Lines of the recommendation section, trimmed.
///
/// Everything after the first marker is scanned; only lines starting with `-`
/// count. No marker yields no recommendations.
pub fn extract_recommendations(text: &str) -> Vec<String> {
    let Some((_, section)) = text.split_once(RECOMMENDATIONS_MARKER) else {
        return Vec::new();
    };
    section
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('-'))
        .map(str::to_string)
        .collect()
}

/// Pick the first review of each required perspective.
///
/// Fails with the exact set of required perspectives that have no review.
pub fn select_reviews(
    reviews: &[Review],
    required: &BTreeSet<String>,
) -> SynthesisResult<BTreeMap<String, String>> {
    let mut selected = BTreeMap::new();
    for review in reviews {
        if !required.contains(&review.perspective) {
            continue;
        }
        if selected.contains_key(&review.perspective) {
            debug!(perspective = %review.perspective, "Ignoring later review for perspective");
            continue;
        }
        selected.insert(review.perspective.clone(), review.text.clone());
    }

    let missing: BTreeSet<String> = required
        .iter()
        .filter(|p| !selected.contains_key(*p))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(SynthesisError::MissingPerspective { missing });
    }
    Ok(selected)
}

/// Turns perspective reviews into a scored [`Synthesis`]
pub struct ReviewSynthesizer {
    inference: Arc<dyn InferenceProvider>,
    scorer: Arc<dyn Scorer>,
    system_prompt: String,
    template: String,
    criteria: Vec<String>,
    feedback_templates: FeedbackTemplates,
    call_timeout: Option<Duration>,
}

impl ReviewSynthesizer {
    pub fn new(
        inference: Arc<dyn InferenceProvider>,
        scorer: Arc<dyn Scorer>,
        config: &ReviewConfig,
    ) -> Self {
        Self {
            inference,
            scorer,
            system_prompt: config.system_prompt.clone(),
            template: config.synthesis_template.clone(),
            criteria: config.criteria.clone(),
            feedback_templates: config.feedback_templates.clone(),
            call_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn criteria(&self) -> &[String] {
        &self.criteria
    }

    /// Synthesize the reviews. Any collaborator failure aborts with no partial result.
    pub async fn synthesize(
        &self,
        reviews: &[Review],
        required: &BTreeSet<String>,
        thresholds: &QualityThresholds,
        cancel: &CancellationToken,
    ) -> SynthesisResult<Synthesis> {
        let start = Instant::now();
        // An empty score map has no average
        if self.criteria.is_empty() {
            return Err(SynthesisError::Scoring {
                message: "no scoring criteria configured".to_string(),
            });
        }
        let perspectives = select_reviews(reviews, required)?;
        let prompt = self.render(&perspectives)?;

        if cancel.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }

        let request = CompletionRequest::new(self.system_prompt.as_str(), prompt);
        let synthesis = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SynthesisError::Cancelled),
            result = complete_within(self.inference.as_ref(), request, self.call_timeout) => result?,
        };

        let recommendations = extract_recommendations(&synthesis);

        let raw_scores = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SynthesisError::Cancelled),
            result = self.scorer.score(&synthesis, &self.criteria) => result?,
        };
        let scores = self.validate_scores(raw_scores)?;

        let average_score = scores.values().sum::<i64>() as f64 / scores.len() as f64;
        let feedback_tier = thresholds.tier(average_score);
        let requires_revision = thresholds.requires_revision(average_score);

        info!(
            perspectives = perspectives.len(),
            recommendations = recommendations.len(),
            average_score,
            tier = %feedback_tier,
            requires_revision,
            latency_ms = start.elapsed().as_millis() as u64,
            "Synthesis completed"
        );

        Ok(Synthesis {
            synthesis,
            recommendations,
            scores,
            average_score,
            feedback_template: self.feedback_templates.for_tier(feedback_tier).to_string(),
            feedback_tier,
            requires_revision,
            perspectives,
        })
    }

    fn render(&self, perspectives: &BTreeMap<String, String>) -> SynthesisResult<String> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        let template = env.template_from_str(&self.template)?;
        Ok(template.render(perspectives)?)
    }

    /// Keep one score per configured criterion, each within [1, 10]
    fn validate_scores(
        &self,
        mut raw: BTreeMap<String, i64>,
    ) -> SynthesisResult<BTreeMap<String, i64>> {
        let mut scores = BTreeMap::new();
        for criterion in &self.criteria {
            let score = raw
                .remove(criterion)
                .ok_or_else(|| SynthesisError::UnscoredCriterion {
                    criterion: criterion.clone(),
                })?;
            if !(1..=10).contains(&score) {
                return Err(SynthesisError::Validation {
                    criterion: criterion.clone(),
                    score,
                });
            }
            scores.insert(criterion.clone(), score);
        }
        Ok(scores)
    }
}
