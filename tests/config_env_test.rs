//! Config environment variable tests
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use review_panel::config::{Config, EmbeddingProvider, LogFormat};
use review_panel::AppError;
use serial_test::serial;
use std::env;

const PANEL_VARS: &[&str] = &[
    "LANGBASE_BASE_URL",
    "PIPE_PANEL",
    "PANEL_MODEL",
    "DATABASE_PATH",
    "DATABASE_MAX_CONNECTIONS",
    "LOG_FORMAT",
    "MAX_RETRIES",
    "EMBEDDING_PROVIDER",
    "EMBEDDING_API_KEY",
    "EMBEDDING_DIMENSIONS",
    "PANEL_CONFIG_PATH",
    "PANEL_CONCURRENCY",
    "RATE_LIMIT_MS",
    "INFERENCE_TIMEOUT_MS",
    "RESULTS_DIR",
    "CLIENT_NAME",
];

fn reset_env() {
    env::set_var("LANGBASE_API_KEY", "test-key");
    for var in PANEL_VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults() {
    reset_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.langbase.base_url, "https://api.langbase.com");
    assert_eq!(config.pipes.panel, "review-panel-v1");
    assert_eq!(config.pipes.model, "openai:gpt-4o-mini");
    assert_eq!(config.request.max_retries, 0);
    assert_eq!(config.embedding.provider, EmbeddingProvider::Hashing);
    assert_eq!(config.embedding.dimensions, 384);
    assert_eq!(config.orchestration.concurrency, 2);
    assert_eq!(config.orchestration.rate_limit_ms, 1000);
    assert!(config.orchestration.inference_timeout_ms.is_none());
    assert_eq!(config.orchestration.client_name, "panel");
    assert!(config.orchestration.panel_config_path.is_none());
}

#[test]
#[serial]
fn test_missing_api_key_is_a_config_error() {
    reset_env();
    env::remove_var("LANGBASE_API_KEY");

    let err = Config::from_env().unwrap_err();
    assert!(matches!(err, AppError::Config { .. }));
    assert!(err.to_string().contains("LANGBASE_API_KEY"));

    env::set_var("LANGBASE_API_KEY", "test-key");
}

#[test]
#[serial]
fn test_overrides() {
    reset_env();
    env::set_var("PIPE_PANEL", "custom-pipe");
    env::set_var("PANEL_MODEL", "anthropic:claude");
    env::set_var("DATABASE_PATH", "/custom/panel.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");
    env::set_var("LOG_FORMAT", "json");
    env::set_var("PANEL_CONCURRENCY", "0");
    env::set_var("RATE_LIMIT_MS", "250");
    env::set_var("INFERENCE_TIMEOUT_MS", "30000");
    env::set_var("CLIENT_NAME", "Internal");

    let config = Config::from_env().unwrap();
    assert_eq!(config.pipes.panel, "custom-pipe");
    assert_eq!(config.pipes.model, "anthropic:claude");
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/panel.db");
    assert_eq!(config.database.max_connections, 10);
    assert_eq!(config.logging.format, LogFormat::Json);
    // Concurrency never drops below one session
    assert_eq!(config.orchestration.concurrency, 1);
    assert_eq!(config.orchestration.rate_limit_ms, 250);
    assert_eq!(config.orchestration.inference_timeout_ms, Some(30000));
    assert_eq!(config.orchestration.client_name, "Internal");

    reset_env();
}

#[test]
#[serial]
fn test_remote_embeddings_require_a_key() {
    reset_env();
    env::set_var("EMBEDDING_PROVIDER", "remote");

    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("EMBEDDING_API_KEY"));

    env::set_var("EMBEDDING_API_KEY", "voyage-key");
    let config = Config::from_env().unwrap();
    assert_eq!(config.embedding.provider, EmbeddingProvider::Remote);

    reset_env();
}

#[test]
#[serial]
fn test_unknown_embedding_provider() {
    reset_env();
    env::set_var("EMBEDDING_PROVIDER", "magic");

    assert!(matches!(Config::from_env(), Err(AppError::Config { .. })));

    reset_env();
}

#[test]
#[serial]
fn test_panel_loaded_from_file() {
    reset_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("panel.json");

    let mut panel = review_panel::config::PanelConfig::builtin();
    panel.roles[0].max_history = 3;
    std::fs::write(&path, serde_json::to_string(&panel).unwrap()).unwrap();
    env::set_var("PANEL_CONFIG_PATH", &path);

    let config = Config::from_env().unwrap();
    let loaded = config.load_panel().unwrap();
    assert_eq!(loaded.roles[0].max_history, 3);

    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(config.load_panel(), Err(AppError::Config { .. })));

    reset_env();
}

#[test]
#[serial]
fn test_builtin_panel_when_no_path() {
    reset_env();

    let panel = Config::from_env().unwrap().load_panel().unwrap();
    let ids: Vec<_> = panel.roles.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["internal", "external"]);
}
