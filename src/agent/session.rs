use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::rate_limit::RateLimiter;
use super::role::RoleSpec;
use crate::error::{AgentError, AgentResult, RetrievalError};
use crate::inference::{complete_within, CompletionRequest, InferenceProvider};
use crate::retrieval::{QueryHit, RetrievalStore};

/// Outputs of one session keyed by phase name
pub type PhaseOutputs = BTreeMap<String, String>;

/// One history line with the step that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step: u32,
    pub text: String,
}

/// Serializable copy of a session's mutable state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub role: String,
    pub history: Vec<HistoryEntry>,
    pub prev_response: String,
}

/// Arguments of a single phase call
#[derive(Debug, Clone)]
pub struct PhaseParams {
    pub question: String,
    pub phase: String,
    pub step: u32,
    pub feedback: String,
    pub temperature: Option<f64>,
}

impl PhaseParams {
    pub fn new(question: impl Into<String>, phase: impl Into<String>, step: u32) -> Self {
        Self {
            question: question.into(),
            phase: phase.into(),
            step,
            feedback: String::new(),
            temperature: None,
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = feedback.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// One panel role driven through its phases.
///
/// Holds the bounded history, the previous response and the rate-limit gate.
/// A failed or cancelled phase leaves all of them as they were.
pub struct AgentSession {
    role: RoleSpec,
    inference: Arc<dyn InferenceProvider>,
    retrieval: Option<RetrievalStore>,
    history: VecDeque<HistoryEntry>,
    prev_response: String,
    rate_limiter: RateLimiter,
    call_timeout: Option<Duration>,
}

impl AgentSession {
    pub fn new(role: RoleSpec, inference: Arc<dyn InferenceProvider>) -> Self {
        let capacity = role.max_history;
        Self {
            role,
            inference,
            retrieval: None,
            history: VecDeque::with_capacity(capacity),
            prev_response: String::new(),
            rate_limiter: RateLimiter::default(),
            call_timeout: None,
        }
    }

    /// Attach the store used for the role's retrieval settings
    pub fn with_retrieval(mut self, store: RetrievalStore) -> Self {
        self.retrieval = Some(store);
        self
    }

    pub fn with_rate_limit(mut self, min_interval: Duration) -> Self {
        self.rate_limiter = RateLimiter::new(min_interval);
        self
    }

    /// Bound each inference call; `None` waits indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn role(&self) -> &RoleSpec {
        &self.role
    }

    pub fn phases(&self) -> &[String] {
        &self.role.phases
    }

    pub fn perspective(&self) -> &str {
        &self.role.perspective
    }

    /// History entries, oldest first
    pub fn history(&self) -> impl ExactSizeIterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn prev_response(&self) -> &str {
        &self.prev_response
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            role: self.role.id.clone(),
            history: self.history.iter().cloned().collect(),
            prev_response: self.prev_response.clone(),
        }
    }

    /// Forget history, the previous response and the last call time.
    pub fn reset(&mut self) {
        self.history.clear();
        self.prev_response.clear();
        self.rate_limiter = RateLimiter::new(self.rate_limiter.min_interval());
    }

    /// Run one phase and record its response.
    pub async fn run_phase(
        &mut self,
        params: PhaseParams,
        cancel: &CancellationToken,
    ) -> AgentResult<String> {
        let phase_prompt = match self.role.phase_prompt(&params.phase) {
            Some(prompt) if self.role.has_phase(&params.phase) => prompt.to_string(),
            _ => {
                return Err(AgentError::InvalidPhase {
                    phase: params.phase,
                    role: self.role.id.clone(),
                })
            }
        };

        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            _ = self.rate_limiter.acquire() => {}
        }

        let start = Instant::now();
        let context = self.gather_context(&params.question, cancel).await?;

        let system_prompt = build_system_prompt(&self.role.role_description, &phase_prompt);
        let user_prompt = build_user_prompt(
            &self.history,
            &params,
            &self.role.notes_for(&params.phase),
            &context,
            &self.prev_response,
        );

        debug!(
            role = %self.role.id,
            phase = %params.phase,
            system_len = system_prompt.len(),
            user_len = user_prompt.len(),
            context_documents = context.len(),
            "Calling inference"
        );

        let request = CompletionRequest::new(system_prompt, user_prompt)
            .with_temperature(params.temperature);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            result = complete_within(self.inference.as_ref(), request, self.call_timeout) => {
                result.map_err(|e| {
                    warn!(role = %self.role.id, phase = %params.phase, error = %e, "Phase inference failed");
                    e
                })?
            }
        };

        self.prev_response = response.clone();
        self.history.push_back(HistoryEntry {
            step: params.step,
            text: format!(
                "Step #{}, Phase: {}, Analysis: {}",
                params.step, params.phase, response
            ),
        });
        while self.history.len() > self.role.max_history {
            self.history.pop_front();
        }

        info!(
            role = %self.role.id,
            phase = %params.phase,
            step = params.step,
            latency_ms = start.elapsed().as_millis() as u64,
            "Phase completed"
        );

        Ok(response)
    }

    /// Run every phase in order with steps counting up from 1.
    pub async fn run_all_phases(
        &mut self,
        question: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<PhaseOutputs> {
        let mut outputs = PhaseOutputs::new();
        for (index, phase) in self.role.phases.clone().into_iter().enumerate() {
            let text = self
                .run_phase(PhaseParams::new(question, &phase, index as u32 + 1), cancel)
                .await?;
            outputs.insert(phase, text);
        }
        Ok(outputs)
    }

    /// Re-run each phase of an earlier result with reviewer feedback.
    ///
    /// The earlier output of a phase becomes that phase's question; phases
    /// without an earlier output are skipped.
    pub async fn refine_with_feedback(
        &mut self,
        initial: &PhaseOutputs,
        feedback: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<PhaseOutputs> {
        let mut refined = PhaseOutputs::new();
        for (index, phase) in self.role.phases.clone().into_iter().enumerate() {
            let Some(previous) = initial.get(&phase) else {
                continue;
            };
            let params = PhaseParams::new(previous.as_str(), &phase, index as u32 + 1)
                .with_feedback(feedback);
            let text = self.run_phase(params, cancel).await?;
            refined.insert(phase, text);
        }
        Ok(refined)
    }

    async fn gather_context(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<Vec<QueryHit>> {
        let (Some(store), Some(settings)) = (&self.retrieval, &self.role.retrieval) else {
            return Ok(Vec::new());
        };

        let options = settings.query_options();
        let mut hits = Vec::new();
        for collection in &settings.collections {
            match store
                .query_cancellable(collection, question, &options, cancel)
                .await
            {
                Ok(found) => hits.extend(found),
                Err(RetrievalError::CollectionNotFound { .. }) => {
                    debug!(role = %self.role.id, collection = %collection, "Collection not created yet");
                }
                Err(RetrievalError::Cancelled) => return Err(AgentError::Cancelled),
                Err(e) => return Err(e.into()),
            }
        }
        // Newest first across collections, undated last
        hits.sort_by(|a, b| b.case_date().cmp(a.case_date()));
        hits.truncate(settings.context_documents);
        Ok(hits)
    }
}

fn build_system_prompt(role_description: &str, phase_prompt: &str) -> String {
    format!(
        "You are {}\nTask instructions: {}\n",
        role_description, phase_prompt
    )
}

fn build_user_prompt(
    history: &VecDeque<HistoryEntry>,
    params: &PhaseParams,
    notes: &[&str],
    context: &[QueryHit],
    prev_response: &str,
) -> String {
    let history_text = history
        .iter()
        .map(|entry| entry.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let notes_text = if notes.is_empty() {
        String::new()
    } else {
        format!("Notes for the task objective: {}\n", notes.join("; "))
    };

    let mut prompt = format!(
        "History: {}\n{}\nCurrent Step #{}, Phase: {}\n\
         [Objective] Your goal is to analyze the following question: {}\n\
         Feedback: {}\nNotes: {}\n",
        history_text,
        "~".repeat(10),
        params.step,
        params.phase,
        params.question,
        params.feedback,
        notes_text
    );

    if !context.is_empty() {
        prompt.push_str("Relevant sources:\n");
        for (i, hit) in context.iter().enumerate() {
            let date = hit.case_date();
            if date.is_empty() {
                prompt.push_str(&format!("[{}] {}\n", i + 1, hit.document));
            } else {
                prompt.push_str(&format!("[{}] ({}) {}\n", i + 1, date, hit.document));
            }
        }
    }

    prompt.push_str(&format!(
        "Your previous response was: {}. Please ensure your new analysis adds value.\n\
         Please provide your analysis below:\n",
        prev_response
    ));
    prompt
}
