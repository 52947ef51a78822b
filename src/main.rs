use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use review_panel::{
    cli::{Cli, Commands},
    config::{Config, LogFormat},
    embeddings,
    inference::InferenceProvider,
    langbase::LangbaseClient,
    orchestrator::Orchestrator,
    report,
    retrieval::{metadata_with, QueryOptions, RetrievalStore, VectorIndex},
    storage::{SqliteStorage, Storage},
    synthesis::LlmScorer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Review panel starting...");

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            Arc::new(s)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let embedder = embeddings::from_config(&config.embedding)?;
    let store = RetrievalStore::new(
        config.orchestration.client_name.clone(),
        embedder,
        storage.clone() as Arc<dyn VectorIndex>,
    );

    match cli.command {
        Commands::Analyze {
            question,
            hypo,
            model,
        } => analyze(&config, storage, store, question, hypo, model).await,
        Commands::AddDocument {
            collection,
            client,
            text,
            id,
            tags,
            case_date,
        } => {
            let store = scoped(store, client);
            let metadata = metadata_with(&tags, case_date.as_deref());
            let id = store
                .add_document(&collection, id, &text, metadata)
                .await
                .with_context(|| format!("Failed to add document to {}", collection))?;
            println!("{}", id);
            Ok(())
        }
        Commands::Query {
            collection,
            client,
            text,
            tags,
            threshold,
            limit,
        } => {
            let store = scoped(store, client);
            let mut options = QueryOptions::new();
            if !tags.is_empty() {
                options = options.with_tags(tags);
            }
            if let Some(threshold) = threshold {
                options = options.with_threshold(threshold);
            }
            if let Some(limit) = limit {
                options = options.with_limit(limit);
            }
            let hits = store.query(&collection, &text, &options).await?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
            Ok(())
        }
    }
}

async fn analyze(
    config: &Config,
    storage: Arc<SqliteStorage>,
    store: RetrievalStore,
    question: Option<String>,
    hypo: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    let panel = config.load_panel()?;

    let mut pipes = config.pipes.clone();
    if let Some(model) = model {
        info!(model = %model, "Model selected on the command line");
        pipes.model = model;
    }

    // Initialize Langbase client
    let langbase = match LangbaseClient::new(&config.langbase, config.request.clone(), &pipes) {
        Ok(c) => {
            info!(base_url = %config.langbase.base_url, "Langbase client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Langbase client");
            return Err(e.into());
        }
    };

    // Ensure the panel pipe exists (create if needed)
    if let Err(e) = langbase.ensure_panel_pipe().await {
        error!(error = %e, "Failed to ensure panel pipe exists");
        return Err(e.into());
    }

    let inference: Arc<dyn InferenceProvider> = Arc::new(langbase);
    let scorer = Arc::new(
        LlmScorer::new(inference.clone()).with_timeout(config.orchestration.inference_timeout()),
    );

    let mut orchestrator = Orchestrator::from_panel(
        &panel,
        inference,
        scorer,
        Some(store),
        &config.orchestration,
    )
    .with_storage(storage.clone() as Arc<dyn Storage>)
    .with_pipe_name(pipes.panel.clone());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling analysis");
            on_signal.cancel();
        }
    });

    let record = match (question, hypo) {
        (Some(question), None) => orchestrator.run(&question, &cancel).await,
        (None, Some(hypothetical)) => orchestrator.run_hypothetical(&hypothetical, &cancel).await,
        _ => anyhow::bail!("Provide exactly one of --question or --hypo"),
    };
    let record = match record {
        Ok(record) => record,
        Err(e) => {
            error!(error = %e, "Analysis failed");
            return Err(e.into());
        }
    };

    let dir = report::write_results(&config.orchestration.results_dir, &record)
        .context("Failed to write analysis results")?;

    println!("{}", report::render_summary(&record));
    println!("Analysis {} complete! Results saved in: {}", record.run_id, dir.display());
    Ok(())
}

fn scoped(store: RetrievalStore, client: Option<String>) -> RetrievalStore {
    match client {
        Some(client) => store.with_client_name(client),
        None => store,
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
