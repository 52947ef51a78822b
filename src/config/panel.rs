//! Panel definition: the roles that take part in an analysis and the review settings
//! used to synthesize their output.
//!
//! The panel is loaded once at startup (from JSON, or the built-in definition),
//! validated, and treated as immutable afterwards.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::{RetrievalSettings, RoleSpec, REVIEW_PHASE};
use crate::error::AppError;
use crate::prompts;
use crate::synthesis::{FeedbackTemplates, QualityThresholds, ReviewConfig};

/// Immutable, validated panel definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    pub roles: Vec<RoleSpec>,
    pub review: ReviewConfig,
}

impl PanelConfig {
    /// Parse and validate a panel definition from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::Config {
            message: format!("Failed to read panel config {}: {}", path.display(), e),
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a panel definition from a JSON string
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let config: PanelConfig = serde_json::from_str(raw).map_err(|e| AppError::Config {
            message: format!("Malformed panel config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every role and the review settings; any violation is a startup error.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.roles.is_empty() {
            return Err(config_error("panel defines no roles"));
        }

        let mut seen = HashSet::new();
        for role in &self.roles {
            if !seen.insert(role.id.as_str()) {
                return Err(config_error(format!("duplicate role id '{}'", role.id)));
            }
            role.validate().map_err(config_error)?;
        }

        self.review.validate().map_err(config_error)?;

        for perspective in &self.review.required_perspectives {
            let reviewer = self
                .roles
                .iter()
                .find(|r| &r.perspective == perspective)
                .ok_or_else(|| {
                    config_error(format!("no role provides perspective '{}'", perspective))
                })?;
            if !reviewer.phases.iter().any(|p| p == REVIEW_PHASE) {
                return Err(config_error(format!(
                    "role '{}' provides perspective '{}' but has no '{}' phase",
                    reviewer.id, perspective, REVIEW_PHASE
                )));
            }
        }

        Ok(())
    }

    /// Look up a role by id
    pub fn role(&self, id: &str) -> Option<&RoleSpec> {
        self.roles.iter().find(|r| r.id == id)
    }

    /// The two-role panel shipped with the binary: a domestic practitioner and a
    /// comparative (foreign-law) reviewer.
    pub fn builtin() -> Self {
        let internal = RoleSpec {
            id: "internal".to_string(),
            perspective: "singapore_law".to_string(),
            role_description: prompts::INTERNAL_ROLE_DESCRIPTION.to_string(),
            phases: vec![
                "statutory_analysis".to_string(),
                "case_law_review".to_string(),
                "practice_implications".to_string(),
                REVIEW_PHASE.to_string(),
            ],
            phase_prompts: BTreeMap::from([
                (
                    "statutory_analysis".to_string(),
                    prompts::STATUTORY_ANALYSIS_PROMPT.to_string(),
                ),
                (
                    "case_law_review".to_string(),
                    prompts::CASE_LAW_REVIEW_PROMPT.to_string(),
                ),
                (
                    "practice_implications".to_string(),
                    prompts::PRACTICE_IMPLICATIONS_PROMPT.to_string(),
                ),
                (REVIEW_PHASE.to_string(), prompts::REVIEW_PHASE_PROMPT.to_string()),
            ]),
            notes: Vec::new(),
            max_history: RoleSpec::DEFAULT_MAX_HISTORY,
            retrieval: Some(
                RetrievalSettings::new(vec![
                    "internal-collection".to_string(),
                    "external-collection".to_string(),
                ])
                .with_allowed_collections(vec![
                    "internal-collection".to_string(),
                    "external-collection".to_string(),
                ]),
            ),
        };

        let external = RoleSpec {
            id: "external".to_string(),
            perspective: "us_law".to_string(),
            role_description: prompts::EXTERNAL_ROLE_DESCRIPTION.to_string(),
            phases: vec![
                "comparative_analysis".to_string(),
                "federal_state_review".to_string(),
                "practice_insights".to_string(),
                REVIEW_PHASE.to_string(),
            ],
            phase_prompts: BTreeMap::from([
                (
                    "comparative_analysis".to_string(),
                    prompts::COMPARATIVE_ANALYSIS_PROMPT.to_string(),
                ),
                (
                    "federal_state_review".to_string(),
                    prompts::FEDERAL_STATE_REVIEW_PROMPT.to_string(),
                ),
                (
                    "practice_insights".to_string(),
                    prompts::PRACTICE_INSIGHTS_PROMPT.to_string(),
                ),
                (REVIEW_PHASE.to_string(), prompts::REVIEW_PHASE_PROMPT.to_string()),
            ]),
            notes: Vec::new(),
            max_history: RoleSpec::DEFAULT_MAX_HISTORY,
            retrieval: Some(
                RetrievalSettings::new(vec!["external-collection".to_string()])
                    .with_allowed_collections(vec!["external-collection".to_string()]),
            ),
        };

        let review = ReviewConfig {
            system_prompt: prompts::SYNTHESIS_SYSTEM_PROMPT.to_string(),
            synthesis_template: prompts::SYNTHESIS_TEMPLATE.to_string(),
            criteria: vec![
                "jurisdictional_understanding".to_string(),
                "legal_reasoning".to_string(),
                "comparative_analysis".to_string(),
                "practical_application".to_string(),
                "academic_merit".to_string(),
            ],
            quality_thresholds: QualityThresholds {
                revision_required: 6.0,
                minor_improvements: 8.0,
            },
            feedback_templates: FeedbackTemplates {
                revision_needed: prompts::FEEDBACK_REVISION_NEEDED.to_string(),
                minor_improvements: prompts::FEEDBACK_MINOR_IMPROVEMENTS.to_string(),
                approval: prompts::FEEDBACK_APPROVAL.to_string(),
            },
            required_perspectives: BTreeSet::from([
                "singapore_law".to_string(),
                "us_law".to_string(),
            ]),
        };

        Self {
            roles: vec![internal, external],
            review,
        }
    }
}

fn config_error(message: impl Into<String>) -> AppError {
    AppError::Config {
        message: message.into(),
    }
}
