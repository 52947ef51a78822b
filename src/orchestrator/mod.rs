//! Panel orchestration.
//!
//! Every session runs its phases serially; sessions run concurrently up to a
//! bound. Once all of them have finished, the review outputs are synthesized
//! and an [`AnalysisRecord`] is produced. Any failure aborts the whole run.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::agent::{serialize_for_log, AgentSession, PhaseOutputs, PhaseParams, REVIEW_PHASE};
use crate::config::{OrchestrationConfig, PanelConfig};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::inference::InferenceProvider;
use crate::retrieval::RetrievalStore;
use crate::storage::{AnalysisEntry, Invocation, Storage};
use crate::synthesis::{
    FeedbackTier, QualityThresholds, Review, ReviewConfig, ReviewSynthesizer, Scorer, Synthesis,
};

/// How the `step` of each phase call is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepNumbering {
    /// 1, 2, 3, ... per session
    #[default]
    Incrementing,
    /// Every phase is step 1
    Constant,
}

impl StepNumbering {
    /// Step for the phase at `index` (0-based) of a session
    pub fn step(&self, index: usize) -> u32 {
        match self {
            StepNumbering::Incrementing => index as u32 + 1,
            StepNumbering::Constant => 1,
        }
    }
}

/// Synthesis section of an analysis record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalSynthesis {
    pub synthesis: String,
    pub recommendations: Vec<String>,
    pub scores: BTreeMap<String, i64>,
    pub average_score: f64,
    pub requires_revision: bool,
    pub feedback_tier: FeedbackTier,
    pub feedback_template: String,
}

impl From<Synthesis> for FinalSynthesis {
    fn from(s: Synthesis) -> Self {
        Self {
            synthesis: s.synthesis,
            recommendations: s.recommendations,
            scores: s.scores,
            average_score: s.average_score,
            requires_revision: s.requires_revision,
            feedback_tier: s.feedback_tier,
            feedback_template: s.feedback_template,
        }
    }
}

/// Output of one panel run, serialized as the results file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Identifier of the run; also the key of the stored analysis.
    #[serde(skip)]
    pub run_id: String,
    pub legal_question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypothetical: Option<String>,
    /// Local time, `YYYYMMDD_HHMMSS`
    pub timestamp: String,
    pub model: String,
    /// role id -> phase -> text
    pub agent_outputs: BTreeMap<String, PhaseOutputs>,
    pub final_synthesis: FinalSynthesis,
}

impl AnalysisRecord {
    fn to_entry(&self) -> AnalysisEntry {
        AnalysisEntry {
            id: self.run_id.clone(),
            legal_question: self.legal_question.clone(),
            hypothetical: self.hypothetical.clone(),
            model: self.model.clone(),
            average_score: self.final_synthesis.average_score,
            requires_revision: self.final_synthesis.requires_revision,
            record: serialize_for_log(self, "analysis record"),
            created_at: Utc::now(),
        }
    }
}

/// Writes invocations of one run when a storage is attached
struct RunLog<'a> {
    storage: Option<&'a dyn Storage>,
    run_id: &'a str,
    pipe_name: Option<&'a str>,
}

impl RunLog<'_> {
    fn invocation(&self, operation: String, input: serde_json::Value) -> Invocation {
        let invocation = Invocation::new(operation, input).with_run(self.run_id);
        match self.pipe_name {
            Some(pipe) => invocation.with_pipe(pipe),
            None => invocation,
        }
    }

    async fn record(&self, invocation: Invocation) -> OrchestratorResult<()> {
        if let Some(storage) = self.storage {
            storage.log_invocation(&invocation).await?;
        }
        Ok(())
    }
}

/// Drives a panel of sessions through a question and synthesizes their reviews
pub struct Orchestrator {
    sessions: Vec<AgentSession>,
    synthesizer: ReviewSynthesizer,
    required_perspectives: BTreeSet<String>,
    thresholds: QualityThresholds,
    model: String,
    concurrency: usize,
    step_numbering: StepNumbering,
    storage: Option<Arc<dyn Storage>>,
    pipe_name: Option<String>,
}

impl Orchestrator {
    pub const DEFAULT_CONCURRENCY: usize = 2;

    pub fn new(
        sessions: Vec<AgentSession>,
        synthesizer: ReviewSynthesizer,
        review: &ReviewConfig,
        model: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            synthesizer,
            required_perspectives: review.required_perspectives.clone(),
            thresholds: review.quality_thresholds,
            model: model.into(),
            concurrency: Self::DEFAULT_CONCURRENCY,
            step_numbering: StepNumbering::default(),
            storage: None,
            pipe_name: None,
        }
    }

    /// One session per panel role, all sharing the inference provider.
    ///
    /// Each role reads the store through its own namespace and allow-list.
    /// The recorded model is the provider's.
    pub fn from_panel(
        panel: &PanelConfig,
        inference: Arc<dyn InferenceProvider>,
        scorer: Arc<dyn Scorer>,
        store: Option<RetrievalStore>,
        settings: &OrchestrationConfig,
    ) -> Self {
        let sessions = panel
            .roles
            .iter()
            .map(|role| {
                let session = AgentSession::new(role.clone(), inference.clone())
                    .with_rate_limit(settings.rate_limit())
                    .with_timeout(settings.inference_timeout());
                match (&store, &role.retrieval) {
                    (Some(store), Some(retrieval)) => session.with_retrieval(retrieval.scope(store)),
                    (Some(store), None) => session.with_retrieval(store.clone()),
                    (None, _) => session,
                }
            })
            .collect();

        let synthesizer = ReviewSynthesizer::new(inference.clone(), scorer, &panel.review)
            .with_timeout(settings.inference_timeout());

        Self::new(sessions, synthesizer, &panel.review, inference.model())
            .with_concurrency(settings.concurrency)
    }

    /// Maximum number of sessions running at once (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_step_numbering(mut self, numbering: StepNumbering) -> Self {
        self.step_numbering = numbering;
        self
    }

    /// Log invocations and save finished records
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Pipe name recorded on logged invocations
    pub fn with_pipe_name(mut self, pipe_name: impl Into<String>) -> Self {
        self.pipe_name = Some(pipe_name.into());
        self
    }

    pub fn sessions(&self) -> &[AgentSession] {
        &self.sessions
    }

    /// Analyse a question with every session, then synthesize.
    pub async fn run(
        &mut self,
        question: &str,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<AnalysisRecord> {
        self.execute(question.to_string(), None, cancel).await
    }

    /// Analyse a hypothetical scenario instead of a question.
    ///
    /// The record keeps an empty `legal_question` and the scenario under `hypothetical`.
    pub async fn run_hypothetical(
        &mut self,
        hypothetical: &str,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<AnalysisRecord> {
        self.execute(String::new(), Some(hypothetical.to_string()), cancel)
            .await
    }

    async fn execute(
        &mut self,
        legal_question: String,
        hypothetical: Option<String>,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<AnalysisRecord> {
        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let analysis_text = hypothetical.as_deref().unwrap_or(&legal_question);

        info!(
            run_id = %run_id,
            sessions = self.sessions.len(),
            concurrency = self.concurrency,
            hypothetical = hypothetical.is_some(),
            "Starting panel analysis"
        );

        // Sessions live for one run only
        self.sessions.iter_mut().for_each(AgentSession::reset);

        let log = RunLog {
            storage: self.storage.as_deref(),
            run_id: &run_id,
            pipe_name: self.pipe_name.as_deref(),
        };
        let numbering = self.step_numbering;

        let outputs: Vec<(String, PhaseOutputs)> = stream::iter(
            self.sessions
                .iter_mut()
                .map(|session| drive_session(session, analysis_text, numbering, &log, cancel)),
        )
        .buffer_unordered(self.concurrency)
        .try_collect()
        .await
        .map_err(|e| {
            error!(run_id = %run_id, error = %e, "Panel analysis aborted");
            e
        })?;

        let mut by_role: HashMap<String, PhaseOutputs> = outputs.into_iter().collect();

        // Panel order decides which review wins when perspectives repeat
        let mut reviews = Vec::new();
        for session in &self.sessions {
            if !self.required_perspectives.contains(session.perspective()) {
                continue;
            }
            let review = by_role
                .get(&session.role().id)
                .and_then(|o| o.get(REVIEW_PHASE))
                .ok_or_else(|| OrchestratorError::MissingReview {
                    role: session.role().id.clone(),
                })?;
            reviews.push(Review::new(session.perspective(), review.as_str()));
        }

        let synthesis_start = Instant::now();
        let invocation = log.invocation(
            "synthesis".to_string(),
            serialize_for_log(&reviews, "synthesis reviews"),
        );
        let synthesis = match self
            .synthesizer
            .synthesize(&reviews, &self.required_perspectives, &self.thresholds, cancel)
            .await
        {
            Ok(synthesis) => {
                log.record(invocation.success(
                    serialize_for_log(&synthesis, "synthesis"),
                    synthesis_start.elapsed().as_millis() as i64,
                ))
                .await?;
                synthesis
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Synthesis failed");
                log.record(
                    invocation.failure(e.to_string(), synthesis_start.elapsed().as_millis() as i64),
                )
                .await?;
                return Err(e.into());
            }
        };

        let record = AnalysisRecord {
            run_id: run_id.clone(),
            legal_question,
            hypothetical,
            timestamp,
            model: self.model.clone(),
            agent_outputs: by_role.drain().collect(),
            final_synthesis: synthesis.into(),
        };

        if let Some(storage) = &self.storage {
            storage.save_analysis(&record.to_entry()).await?;
        }

        info!(
            run_id = %run_id,
            average_score = record.final_synthesis.average_score,
            requires_revision = record.final_synthesis.requires_revision,
            latency_ms = start.elapsed().as_millis() as u64,
            "Panel analysis completed"
        );

        Ok(record)
    }
}

/// Run every phase of one session in order
async fn drive_session(
    session: &mut AgentSession,
    question: &str,
    numbering: StepNumbering,
    log: &RunLog<'_>,
    cancel: &CancellationToken,
) -> OrchestratorResult<(String, PhaseOutputs)> {
    let role = session.role().id.clone();
    let phases = session.phases().to_vec();
    let mut outputs = PhaseOutputs::new();

    for (index, phase) in phases.into_iter().enumerate() {
        let step = numbering.step(index);
        let start = Instant::now();
        let invocation = log.invocation(
            format!("phase.{}.{}", role, phase),
            serde_json::json!({ "question": question, "phase": phase, "step": step }),
        );

        match session
            .run_phase(PhaseParams::new(question, &phase, step), cancel)
            .await
        {
            Ok(text) => {
                log.record(invocation.success(
                    serde_json::Value::String(text.clone()),
                    start.elapsed().as_millis() as i64,
                ))
                .await?;
                outputs.insert(phase, text);
            }
            Err(source) => {
                log.record(invocation.failure(source.to_string(), start.elapsed().as_millis() as i64))
                    .await?;
                return Err(OrchestratorError::Phase {
                    role,
                    phase,
                    source,
                });
            }
        }
    }

    Ok((role, outputs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_numbering() {
        assert_eq!(StepNumbering::Incrementing.step(0), 1);
        assert_eq!(StepNumbering::Incrementing.step(3), 4);
        assert_eq!(StepNumbering::Constant.step(3), 1);
        assert_eq!(StepNumbering::default(), StepNumbering::Incrementing);
    }

    #[test]
    fn test_record_field_names() {
        let record = AnalysisRecord {
            run_id: "r".to_string(),
            legal_question: "q".to_string(),
            hypothetical: None,
            timestamp: "20240101_120000".to_string(),
            model: "m".to_string(),
            agent_outputs: BTreeMap::from([(
                "internal".to_string(),
                PhaseOutputs::from([("review".to_string(), "text".to_string())]),
            )]),
            final_synthesis: FinalSynthesis {
                synthesis: "s".to_string(),
                recommendations: vec!["- do".to_string()],
                scores: BTreeMap::from([("legal_reasoning".to_string(), 8)]),
                average_score: 8.0,
                requires_revision: false,
                feedback_tier: FeedbackTier::Approval,
                feedback_template: "ok".to_string(),
            },
        };

        let json = serde_json::to_value(&record).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys.iter().map(String::as_str).collect::<BTreeSet<_>>(),
            BTreeSet::from([
                "legal_question",
                "timestamp",
                "model",
                "agent_outputs",
                "final_synthesis"
            ])
        );
        assert_eq!(json["agent_outputs"]["internal"]["review"], "text");
        assert_eq!(json["final_synthesis"]["requires_revision"], false);
        assert_eq!(json["final_synthesis"]["feedback_tier"], "approval");
    }
}
