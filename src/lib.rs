//! # Review Panel
//!
//! A panel of role-specialized agents analyses a question through a fixed
//! sequence of phases, each phase grounded with documents retrieved from a
//! client-scoped store, and a synthesizer merges the agents' final reviews into
//! one scored verdict with a revision decision.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────── Orchestrator ────────────────┐
//!                 │                                              │
//! question ──► AgentSession (internal) ──┐                       │
//!          ──► AgentSession (external) ──┼─► ReviewSynthesizer ──► AnalysisRecord
//!                 │      ▲               │        │  ▲           │
//!                 │      │ RetrievalStore│        │  │ Scorer    │
//!                 └──────┼───────────────┴────────┼──┼───────────┘
//!                        │                        ▼  │
//!                   SQLite / memory        Langbase Pipes (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use review_panel::{Config, Orchestrator};
//! use review_panel::langbase::LangbaseClient;
//! use review_panel::synthesis::LlmScorer;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let panel = config.load_panel()?;
//!     let client = Arc::new(LangbaseClient::new(&config.langbase, config.request.clone(), &config.pipes)?);
//!     let scorer = Arc::new(LlmScorer::new(client.clone()));
//!     let mut orchestrator =
//!         Orchestrator::from_panel(&panel, client, scorer, None, &config.orchestration);
//!     let record = orchestrator.run("Is the clause enforceable?", &CancellationToken::new()).await?;
//!     println!("{}", serde_json::to_string_pretty(&record)?);
//!     Ok(())
//! }
//! ```

/// Panel roles and the phase state machine.
pub mod agent;
/// Command-line interface definitions.
pub mod cli;
/// Configuration from the environment and the panel definition.
pub mod config;
/// Text embedding backends.
pub mod embeddings;
/// Error types and result aliases.
pub mod error;
/// The inference provider seam.
pub mod inference;
/// Langbase API client and types for pipe communication.
pub mod langbase;
/// Panel orchestration and the analysis record.
pub mod orchestrator;
/// Built-in prompts.
pub mod prompts;
/// Result files of a run.
pub mod report;
/// Client-scoped document store.
pub mod retrieval;
/// SQLite persistence.
pub mod storage;
/// Review synthesis and scoring.
pub mod synthesis;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::{AnalysisRecord, Orchestrator, StepNumbering};
