//! Persistence for analysis runs.
//!
//! SQLite holds the invocation log, finished analysis records and, through
//! [`SqliteStorage`]'s [`VectorIndex`](crate::retrieval::VectorIndex)
//! implementation, the document collections.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

/// A logged model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Unique invocation identifier.
    pub id: String,
    /// Analysis run the call belongs to.
    pub run_id: Option<String>,
    /// What was invoked, e.g. `phase.internal.review` or `synthesis`.
    pub operation: String,
    /// Input parameters as JSON.
    pub input: serde_json::Value,
    /// Output as JSON (if successful).
    pub output: Option<serde_json::Value>,
    /// Name of the Langbase pipe called.
    pub pipe_name: Option<String>,
    pub latency_ms: Option<i64>,
    pub success: bool,
    /// Error message (if failed).
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Invocation {
    /// Create a new invocation log entry
    pub fn new(operation: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: None,
            operation: operation.into(),
            input,
            output: None,
            pipe_name: None,
            latency_ms: None,
            success: true,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Set the analysis run
    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Set the pipe name
    pub fn with_pipe(mut self, pipe_name: impl Into<String>) -> Self {
        self.pipe_name = Some(pipe_name.into());
        self
    }

    /// Mark as successful with output
    pub fn success(mut self, output: serde_json::Value, latency_ms: i64) -> Self {
        self.success = true;
        self.output = Some(output);
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Mark as failed with error
    pub fn failure(mut self, error: impl Into<String>, latency_ms: i64) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// A stored analysis with its headline figures pulled out for listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisEntry {
    pub id: String,
    pub legal_question: String,
    pub hypothetical: Option<String>,
    pub model: String,
    pub average_score: f64,
    pub requires_revision: bool,
    /// The full analysis record as written to the results file
    pub record: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Storage backend for runs.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Log one model call.
    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()>;
    /// All calls of a run, oldest first.
    async fn get_run_invocations(&self, run_id: &str) -> StorageResult<Vec<Invocation>>;

    /// Save a finished analysis.
    async fn save_analysis(&self, entry: &AnalysisEntry) -> StorageResult<()>;
    /// Get an analysis by ID.
    async fn get_analysis(&self, id: &str) -> StorageResult<Option<AnalysisEntry>>;
    /// Most recent analyses first.
    async fn list_analyses(&self, limit: u32) -> StorageResult<Vec<AnalysisEntry>>;
}
