use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::{AnalysisEntry, Invocation, Storage};
use crate::config::DatabaseConfig;
use crate::embeddings::cosine_distance;
use crate::error::{StorageError, StorageResult};
use crate::retrieval::{CollectionKey, Document, Neighbor, VectorIndex};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Private in-memory database on a single long-lived connection
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization {
        message: format!("Failed to serialize {}: {}", what, e),
    })
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> StorageResult<T> {
    serde_json::from_str(raw).map_err(|e| StorageError::Serialization {
        message: format!("Failed to deserialize {}: {}", what, e),
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()> {
        let input = to_json(&invocation.input, "invocation input")?;
        let output = invocation
            .output
            .as_ref()
            .map(|o| to_json(o, "invocation output"))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO invocations (id, run_id, operation, input, output, pipe_name, latency_ms, success, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invocation.id)
        .bind(&invocation.run_id)
        .bind(&invocation.operation)
        .bind(&input)
        .bind(&output)
        .bind(&invocation.pipe_name)
        .bind(invocation.latency_ms)
        .bind(invocation.success)
        .bind(&invocation.error)
        .bind(invocation.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_run_invocations(&self, run_id: &str) -> StorageResult<Vec<Invocation>> {
        let rows: Vec<InvocationRow> = sqlx::query_as(
            r#"
            SELECT id, run_id, operation, input, output, pipe_name, latency_ms, success, error, created_at
            FROM invocations
            WHERE run_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Invocation::try_from).collect()
    }

    async fn save_analysis(&self, entry: &AnalysisEntry) -> StorageResult<()> {
        let record = to_json(&entry.record, "analysis record")?;

        sqlx::query(
            r#"
            INSERT INTO analyses (id, legal_question, hypothetical, model, average_score, requires_revision, record, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.legal_question)
        .bind(&entry.hypothetical)
        .bind(&entry.model)
        .bind(entry.average_score)
        .bind(entry.requires_revision)
        .bind(&record)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_analysis(&self, id: &str) -> StorageResult<Option<AnalysisEntry>> {
        let row: Option<AnalysisRow> = sqlx::query_as(
            r#"
            SELECT id, legal_question, hypothetical, model, average_score, requires_revision, record, created_at
            FROM analyses
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AnalysisEntry::try_from).transpose()
    }

    async fn list_analyses(&self, limit: u32) -> StorageResult<Vec<AnalysisEntry>> {
        let rows: Vec<AnalysisRow> = sqlx::query_as(
            r#"
            SELECT id, legal_question, hypothetical, model, average_score, requires_revision, record, created_at
            FROM analyses
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AnalysisEntry::try_from).collect()
    }
}

#[async_trait]
impl VectorIndex for SqliteStorage {
    async fn has_collection(&self, key: &CollectionKey) -> StorageResult<bool> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM collections WHERE client = ? AND name = ?")
                .bind(&key.client)
                .bind(&key.collection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn ensure_collection(&self, key: &CollectionKey) -> StorageResult<()> {
        sqlx::query("INSERT OR IGNORE INTO collections (client, name, created_at) VALUES (?, ?, ?)")
            .bind(&key.client)
            .bind(&key.collection)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_collections(&self, client: &str) -> StorageResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM collections WHERE client = ? ORDER BY name")
                .bind(client)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn upsert(&self, key: &CollectionKey, document: Document) -> StorageResult<()> {
        let metadata = to_json(&document.metadata, "document metadata")?;
        let embedding = to_json(&document.embedding, "document embedding")?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO collections (client, name, created_at) VALUES (?, ?, ?)")
            .bind(&key.client)
            .bind(&key.collection)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        // ON CONFLICT keeps the row (and its seq), so replaced documents hold their position
        sqlx::query(
            r#"
            INSERT INTO documents (client, collection, id, text, metadata, embedding, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(client, collection, id) DO UPDATE SET
                text = excluded.text,
                metadata = excluded.metadata,
                embedding = excluded.embedding,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&key.client)
        .bind(&key.collection)
        .bind(&document.id)
        .bind(&document.text)
        .bind(&metadata)
        .bind(&embedding)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        key: &CollectionKey,
        vector: &[f32],
        limit: usize,
        tags: Option<&BTreeSet<String>>,
    ) -> StorageResult<Vec<Neighbor>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT id, text, metadata, embedding
            FROM documents
            WHERE client = ? AND collection = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(&key.client)
        .bind(&key.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut neighbors = Vec::with_capacity(rows.len());
        for row in rows {
            let document = Document::try_from(row)?;
            if tags.map_or(true, |t| document.has_any_tag(t)) {
                neighbors.push(Neighbor {
                    distance: cosine_distance(vector, &document.embedding),
                    document,
                });
            }
        }

        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(limit);
        Ok(neighbors)
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct InvocationRow {
    id: String,
    run_id: Option<String>,
    operation: String,
    input: String,
    output: Option<String>,
    pipe_name: Option<String>,
    latency_ms: Option<i64>,
    success: bool,
    error: Option<String>,
    created_at: String,
}

impl TryFrom<InvocationRow> for Invocation {
    type Error = StorageError;

    fn try_from(row: InvocationRow) -> StorageResult<Self> {
        Ok(Self {
            id: row.id,
            run_id: row.run_id,
            operation: row.operation,
            input: from_json(&row.input, "invocation input")?,
            output: row
                .output
                .as_deref()
                .map(|o| from_json(o, "invocation output"))
                .transpose()?,
            pipe_name: row.pipe_name,
            latency_ms: row.latency_ms,
            success: row.success,
            error: row.error,
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: String,
    legal_question: String,
    hypothetical: Option<String>,
    model: String,
    average_score: f64,
    requires_revision: bool,
    record: String,
    created_at: String,
}

impl TryFrom<AnalysisRow> for AnalysisEntry {
    type Error = StorageError;

    fn try_from(row: AnalysisRow) -> StorageResult<Self> {
        Ok(Self {
            id: row.id,
            legal_question: row.legal_question,
            hypothetical: row.hypothetical,
            model: row.model,
            average_score: row.average_score,
            requires_revision: row.requires_revision,
            record: from_json(&row.record, "analysis record")?,
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    text: String,
    metadata: String,
    embedding: String,
}

impl TryFrom<DocumentRow> for Document {
    type Error = StorageError;

    fn try_from(row: DocumentRow) -> StorageResult<Self> {
        Ok(Self {
            metadata: from_json(&row.metadata, "document metadata")?,
            embedding: from_json(&row.embedding, "document embedding")?,
            id: row.id,
            text: row.text,
        })
    }
}
