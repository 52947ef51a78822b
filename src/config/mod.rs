mod panel;

pub use panel::*;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: LangbaseConfig,
    pub embedding: EmbeddingConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub orchestration: OrchestrationConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Which embedder backs the document store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local deterministic feature-hashing embedder
    Hashing,
    /// OpenAI/Voyage-compatible `/embeddings` endpoint
    Remote,
}

/// Embedding configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Langbase pipe used for every panel call
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub panel: String,
    pub model: String,
}

/// Settings for driving the panel
#[derive(Debug, Clone)]
pub struct OrchestrationConfig {
    /// Panel definition file; the built-in panel is used when unset.
    pub panel_config_path: Option<PathBuf>,
    /// Maximum number of agent sessions driven at once.
    pub concurrency: usize,
    /// Minimum interval between two inference calls of one session.
    pub rate_limit_ms: u64,
    /// Per-call inference timeout, disabled when unset.
    pub inference_timeout_ms: Option<u64>,
    pub results_dir: PathBuf,
    /// Namespace for the document store collections.
    pub client_name: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").map_err(|_| AppError::Config {
                message: "LANGBASE_API_KEY is required".to_string(),
            })?,
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
        };

        let provider = match env::var("EMBEDDING_PROVIDER")
            .unwrap_or_else(|_| "hashing".to_string())
            .to_lowercase()
            .as_str()
        {
            "hashing" => EmbeddingProvider::Hashing,
            "remote" => EmbeddingProvider::Remote,
            other => {
                return Err(AppError::Config {
                    message: format!("Unknown EMBEDDING_PROVIDER: {}", other),
                })
            }
        };
        let embedding = EmbeddingConfig {
            provider,
            api_key: env::var("EMBEDDING_API_KEY").ok(),
            base_url: env::var("EMBEDDING_BASE_URL")
                .unwrap_or_else(|_| "https://api.voyageai.com/v1".to_string()),
            model: env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "voyage-3-large".to_string()),
            dimensions: env_or("EMBEDDING_DIMENSIONS", 384),
        };
        if embedding.provider == EmbeddingProvider::Remote && embedding.api_key.is_none() {
            return Err(AppError::Config {
                message: "EMBEDDING_API_KEY is required for the remote embedding provider"
                    .to_string(),
            });
        }

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/panel.db".to_string()),
            ),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", 60000),
            max_retries: env_or("MAX_RETRIES", 0),
            retry_delay_ms: env_or("RETRY_DELAY_MS", 1000),
        };

        let pipes = PipeConfig {
            panel: env::var("PIPE_PANEL").unwrap_or_else(|_| "review-panel-v1".to_string()),
            model: env::var("PANEL_MODEL").unwrap_or_else(|_| "openai:gpt-4o-mini".to_string()),
        };

        let orchestration = OrchestrationConfig {
            panel_config_path: env::var("PANEL_CONFIG_PATH").ok().map(PathBuf::from),
            concurrency: env_or("PANEL_CONCURRENCY", 2usize).max(1),
            rate_limit_ms: env_or("RATE_LIMIT_MS", 1000),
            inference_timeout_ms: env::var("INFERENCE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok()),
            results_dir: PathBuf::from(
                env::var("RESULTS_DIR").unwrap_or_else(|_| "./results".to_string()),
            ),
            client_name: env::var("CLIENT_NAME").unwrap_or_else(|_| "panel".to_string()),
        };

        Ok(Config {
            langbase,
            embedding,
            database,
            logging,
            request,
            pipes,
            orchestration,
        })
    }

    /// Load the panel definition named by `PANEL_CONFIG_PATH`, or the built-in panel.
    pub fn load_panel(&self) -> Result<PanelConfig, AppError> {
        match &self.orchestration.panel_config_path {
            Some(path) => PanelConfig::from_file(path),
            None => Ok(PanelConfig::builtin()),
        }
    }
}

impl OrchestrationConfig {
    /// Minimum interval between two calls of one session
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    /// Per-call inference timeout, if configured
    pub fn inference_timeout(&self) -> Option<Duration> {
        self.inference_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60000,
            max_retries: 0,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            panel_config_path: None,
            concurrency: 2,
            rate_limit_ms: 1000,
            inference_timeout_ms: None,
            results_dir: PathBuf::from("./results"),
            client_name: "panel".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_config_default_has_no_retries() {
        let config = RequestConfig::default();
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.timeout_ms, 60000);
    }

    #[test]
    fn test_orchestration_durations() {
        let config = OrchestrationConfig {
            inference_timeout_ms: Some(2500),
            ..OrchestrationConfig::default()
        };
        assert_eq!(config.rate_limit(), Duration::from_secs(1));
        assert_eq!(config.inference_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(OrchestrationConfig::default().inference_timeout(), None);
    }
}
