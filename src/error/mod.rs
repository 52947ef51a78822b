use std::collections::BTreeSet;

use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Orchestration error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Analysis not found: {analysis_id}")]
    AnalysisNotFound { analysis_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Errors raised by an inference provider (the Langbase client or any other backend)
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Provider unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Provider error: {message}")]
    Provider { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Embedding computation errors
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid embedding response: {message}")]
    InvalidResponse { message: String },

    #[error("Cannot embed empty text")]
    EmptyInput,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Document store errors
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Collection not found: {client}/{collection}")]
    CollectionNotFound { client: String, collection: String },

    #[error("Collection {collection} is not allowed for client {client}")]
    CollectionNotAllowed { client: String, collection: String },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Retrieval cancelled")]
    Cancelled,
}

/// Agent session errors
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid phase '{phase}' for role {role}")]
    InvalidPhase { phase: String, role: String },

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Context retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Phase call cancelled")]
    Cancelled,
}

/// Review synthesis errors
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Missing required perspectives: {missing:?}")]
    MissingPerspective { missing: BTreeSet<String> },

    #[error("Synthesis inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Scoring failed: {message}")]
    Scoring { message: String },

    #[error("Score for {criterion} out of range [1, 10]: {score}")]
    Validation { criterion: String, score: i64 },

    #[error("No score returned for criterion {criterion}")]
    UnscoredCriterion { criterion: String },

    #[error("Template rendering failed: {message}")]
    Template { message: String },

    #[error("Synthesis cancelled")]
    Cancelled,
}

/// Orchestration errors, naming the role and phase implicated
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Role {role} failed in phase {phase}: {source}")]
    Phase {
        role: String,
        phase: String,
        #[source]
        source: AgentError,
    },

    #[error("Role {role} produced no review output")]
    MissingReview { role: String },

    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl From<minijinja::Error> for SynthesisError {
    fn from(err: minijinja::Error) -> Self {
        SynthesisError::Template {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for inference calls
pub type InferenceResult<T> = Result<T, InferenceError>;

/// Result type alias for embedding calls
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Result type alias for retrieval operations
pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Result type alias for agent session operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Result type alias for synthesis operations
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// Result type alias for orchestration runs
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_inference_error_display() {
        let err = InferenceError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "Provider unavailable: server down (retries: 3)");

        let err = InferenceError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = InferenceError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_agent_error_names_phase_and_role() {
        let err = AgentError::InvalidPhase {
            phase: "closing_argument".to_string(),
            role: "internal".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid phase 'closing_argument' for role internal"
        );
    }

    #[test]
    fn test_missing_perspective_lists_exact_set() {
        let err = SynthesisError::MissingPerspective {
            missing: BTreeSet::from(["us_law".to_string()]),
        };
        assert_eq!(err.to_string(), "Missing required perspectives: {\"us_law\"}");
    }

    #[test]
    fn test_retrieval_error_display() {
        let err = RetrievalError::CollectionNotFound {
            client: "Internal".to_string(),
            collection: "cases".to_string(),
        };
        assert_eq!(err.to_string(), "Collection not found: Internal/cases");

        let err = RetrievalError::CollectionNotAllowed {
            client: "External".to_string(),
            collection: "collection1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Collection collection1 is not allowed for client External"
        );
    }

    #[test]
    fn test_orchestrator_error_wraps_phase_failure() {
        let err = OrchestratorError::Phase {
            role: "external".to_string(),
            phase: "review".to_string(),
            source: AgentError::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "Role external failed in phase review: Phase call cancelled"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_validation_error_display() {
        let err = SynthesisError::Validation {
            criterion: "legal_reasoning".to_string(),
            score: 11,
        };
        assert_eq!(
            err.to_string(),
            "Score for legal_reasoning out of range [1, 10]: 11"
        );
    }

    #[test]
    fn test_inference_error_conversion_to_agent_error() {
        let err: AgentError = InferenceError::Timeout { timeout_ms: 1000 }.into();
        assert!(matches!(err, AgentError::Inference(InferenceError::Timeout { .. })));
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let err: AppError = StorageError::AnalysisNotFound {
            analysis_id: "a-1".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Storage(_)));
    }

    #[test]
    fn test_embedding_error_conversion_to_retrieval_error() {
        let err: RetrievalError = EmbeddingError::EmptyInput.into();
        assert!(matches!(err, RetrievalError::Embedding(_)));
    }
}
