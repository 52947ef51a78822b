//! Client-scoped document store with similarity and tag filtering.
//!
//! A [`RetrievalStore`] owns the collections of one client namespace. Documents
//! are embedded on insertion; queries embed the query text, ask the
//! [`VectorIndex`] for nearest neighbours, keep the hits whose similarity
//! (`1 - cosine distance`) reaches the threshold and rank them by `case_date`,
//! newest first.

mod memory;

pub use memory::MemoryIndex;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::embeddings::Embedder;
use crate::error::{RetrievalError, RetrievalResult, StorageResult};

/// Document metadata: string keys to scalar or string-list JSON values
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding the document's tag list
pub const TAGS_KEY: &str = "tags";
/// Metadata key holding the document's ISO-8601 date
pub const CASE_DATE_KEY: &str = "case_date";

/// Default minimum similarity for a query hit
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Address of a collection: `(client_name, collection_name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionKey {
    pub client: String,
    pub collection: String,
}

impl CollectionKey {
    pub fn new(client: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            collection: collection.into(),
        }
    }
}

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

impl Document {
    /// Tags from metadata; a single string counts as one tag
    pub fn tags(&self) -> Vec<&str> {
        match self.metadata.get(TAGS_KEY) {
            Some(serde_json::Value::Array(values)) => {
                values.iter().filter_map(|v| v.as_str()).collect()
            }
            Some(serde_json::Value::String(tag)) => vec![tag.as_str()],
            _ => Vec::new(),
        }
    }

    /// True when at least one tag is a member of `wanted`
    pub fn has_any_tag(&self, wanted: &BTreeSet<String>) -> bool {
        self.tags().into_iter().any(|t| wanted.contains(t))
    }

    /// `case_date` from metadata, empty when absent
    pub fn case_date(&self) -> &str {
        self.metadata
            .get(CASE_DATE_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }
}

/// A nearest-neighbour candidate
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub document: Document,
    /// Cosine distance in [0, 2]
    pub distance: f32,
}

/// Nearest-neighbour provider and document holder for all collections.
///
/// Every method is atomic from the caller's point of view: a search never
/// observes a partially written document.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Whether the collection has been created
    async fn has_collection(&self, key: &CollectionKey) -> StorageResult<bool>;

    /// Create the collection if it does not exist
    async fn ensure_collection(&self, key: &CollectionKey) -> StorageResult<()>;

    /// Collection names of one client, sorted
    async fn list_collections(&self, client: &str) -> StorageResult<Vec<String>>;

    /// Insert the document, or replace the one with the same id in place
    async fn upsert(&self, key: &CollectionKey, document: Document) -> StorageResult<()>;

    /// Up to `limit` documents in ascending distance order. When `tags` is
    /// given only documents carrying at least one of them are candidates.
    async fn search(
        &self,
        key: &CollectionKey,
        vector: &[f32],
        limit: usize,
        tags: Option<&BTreeSet<String>>,
    ) -> StorageResult<Vec<Neighbor>>;
}

/// Query parameters
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Restrict to documents sharing at least one tag; empty means no restriction.
    pub tags: Option<BTreeSet<String>>,
    pub similarity_threshold: f32,
    /// Candidate limit; the store's default applies when unset.
    pub limit: Option<usize>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            tags: None,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            limit: None,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_threshold(mut self, similarity_threshold: f32) -> Self {
        self.similarity_threshold = similarity_threshold;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One query result; `document`, `metadata` and `score` always describe the same hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub score: f32,
}

impl QueryHit {
    pub fn case_date(&self) -> &str {
        self.metadata
            .get(CASE_DATE_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }
}

/// Document store for one client namespace
#[derive(Clone)]
pub struct RetrievalStore {
    client_name: String,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    allowed_collections: BTreeSet<String>,
    default_limit: usize,
}

impl RetrievalStore {
    /// Create a store for `client_name` with no collection restrictions
    pub fn new(
        client_name: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            embedder,
            index,
            allowed_collections: BTreeSet::new(),
            default_limit: usize::MAX,
        }
    }

    /// Only allow the listed collections; an empty list allows all
    pub fn with_allowed_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_collections = collections.into_iter().map(Into::into).collect();
        self
    }

    /// Same embedder and index under another client namespace
    pub fn with_client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    /// Candidate limit used when a query does not set one
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit.max(1);
        self
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    fn key(&self, collection: &str) -> RetrievalResult<CollectionKey> {
        if !self.allowed_collections.is_empty() && !self.allowed_collections.contains(collection)
        {
            return Err(RetrievalError::CollectionNotAllowed {
                client: self.client_name.clone(),
                collection: collection.to_string(),
            });
        }
        Ok(CollectionKey::new(&self.client_name, collection))
    }

    /// Create the collection if needed ("get or create")
    pub async fn get_or_create_collection(&self, collection: &str) -> RetrievalResult<()> {
        let key = self.key(collection)?;
        self.index.ensure_collection(&key).await?;
        Ok(())
    }

    /// Embed and store a document, replacing any document with the same id.
    ///
    /// Returns the id used; a UUID is generated when none is supplied.
    pub async fn add_document(
        &self,
        collection: &str,
        id: Option<String>,
        text: &str,
        metadata: Metadata,
    ) -> RetrievalResult<String> {
        let key = self.key(collection)?;
        let embedding = self.embedder.embed(text).await?;
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());

        self.index.ensure_collection(&key).await?;
        self.index
            .upsert(
                &key,
                Document {
                    id: id.clone(),
                    text: text.to_string(),
                    metadata,
                    embedding,
                },
            )
            .await?;

        debug!(
            client = %self.client_name,
            collection = %collection,
            document_id = %id,
            "Document stored"
        );
        Ok(id)
    }

    /// Similarity query, filtered by threshold and tags, newest `case_date` first.
    pub async fn query(
        &self,
        collection: &str,
        query_text: &str,
        options: &QueryOptions,
    ) -> RetrievalResult<Vec<QueryHit>> {
        let key = self.key(collection)?;
        if !self.index.has_collection(&key).await? {
            return Err(RetrievalError::CollectionNotFound {
                client: self.client_name.clone(),
                collection: collection.to_string(),
            });
        }

        let vector = self.embedder.embed(query_text).await?;
        let tags = options.tags.as_ref().filter(|t| !t.is_empty());
        let limit = options.limit.unwrap_or(self.default_limit);

        let candidates = self.index.search(&key, &vector, limit, tags).await?;
        let candidate_count = candidates.len();

        let mut hits: Vec<QueryHit> = candidates
            .into_iter()
            .filter(|n| tags.map_or(true, |t| n.document.has_any_tag(t)))
            .map(|n| QueryHit {
                score: 1.0 - n.distance,
                id: n.document.id,
                document: n.document.text,
                metadata: n.document.metadata,
            })
            .filter(|hit| hit.score >= options.similarity_threshold)
            .collect();

        // Stable: equal dates keep the index's distance order
        hits.sort_by(|a, b| b.case_date().cmp(a.case_date()));

        info!(
            client = %self.client_name,
            collection = %collection,
            candidates = candidate_count,
            hits = hits.len(),
            threshold = options.similarity_threshold,
            "Retrieval query completed"
        );
        Ok(hits)
    }

    /// [`query`](Self::query) that gives up with `Cancelled` when the token fires
    pub async fn query_cancellable(
        &self,
        collection: &str,
        query_text: &str,
        options: &QueryOptions,
        cancel: &CancellationToken,
    ) -> RetrievalResult<Vec<QueryHit>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RetrievalError::Cancelled),
            result = self.query(collection, query_text, options) => result,
        }
    }

    /// Texts of the hits only
    pub async fn query_documents(
        &self,
        collection: &str,
        query_text: &str,
        options: &QueryOptions,
    ) -> RetrievalResult<Vec<String>> {
        let hits = self.query(collection, query_text, options).await?;
        Ok(hits.into_iter().map(|h| h.document).collect())
    }

    /// Metadata of the hits only
    pub async fn query_metadatas(
        &self,
        collection: &str,
        query_text: &str,
        options: &QueryOptions,
    ) -> RetrievalResult<Vec<Metadata>> {
        let hits = self.query(collection, query_text, options).await?;
        Ok(hits.into_iter().map(|h| h.metadata).collect())
    }

    /// Collections created so far in this namespace
    pub async fn collections(&self) -> RetrievalResult<Vec<String>> {
        Ok(self.index.list_collections(&self.client_name).await?)
    }
}

/// Build metadata from optional tags and date
pub fn metadata_with(tags: &[String], case_date: Option<&str>) -> Metadata {
    let mut metadata = Metadata::new();
    if !tags.is_empty() {
        metadata.insert(TAGS_KEY.to_string(), serde_json::json!(tags));
    }
    if let Some(date) = case_date {
        metadata.insert(CASE_DATE_KEY.to_string(), serde_json::json!(date));
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use serde_json::json;

    fn store() -> RetrievalStore {
        RetrievalStore::new(
            "Internal",
            Arc::new(HashingEmbedder::new(128)),
            Arc::new(MemoryIndex::new()),
        )
    }

    #[test]
    fn test_document_tag_and_date_accessors() {
        let mut metadata = Metadata::new();
        metadata.insert("tags".to_string(), json!(["contract", "tort"]));
        metadata.insert("case_date".to_string(), json!("2024-06-01"));
        let doc = Document {
            id: "a".to_string(),
            text: "t".to_string(),
            metadata,
            embedding: vec![],
        };
        assert_eq!(doc.tags(), vec!["contract", "tort"]);
        assert_eq!(doc.case_date(), "2024-06-01");
        assert!(doc.has_any_tag(&BTreeSet::from(["tort".to_string()])));
        assert!(!doc.has_any_tag(&BTreeSet::from(["tor".to_string()])));
    }

    #[test]
    fn test_missing_case_date_is_empty() {
        let doc = Document {
            id: "a".to_string(),
            text: "t".to_string(),
            metadata: Metadata::new(),
            embedding: vec![],
        };
        assert_eq!(doc.case_date(), "");
        assert!(doc.tags().is_empty());
    }

    #[tokio::test]
    async fn test_query_unknown_collection_is_not_found() {
        let err = store()
            .query("nope", "anything", &QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::CollectionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_allow_list_rejects_other_collections() {
        let store = store().with_allowed_collections(["collection2", "collection3"]);
        let err = store
            .add_document("collection1", None, "text", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::CollectionNotAllowed { .. }));

        store
            .add_document("collection2", None, "text", Metadata::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_document_generates_id_and_creates_collection() {
        let store = store();
        let id = store
            .add_document("cases", None, "duty of care", Metadata::new())
            .await
            .unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(store.collections().await.unwrap(), vec!["cases".to_string()]);
    }

    #[tokio::test]
    async fn test_identical_text_scores_one_and_passes_threshold() {
        let store = store();
        store
            .add_document(
                "cases",
                Some("a".to_string()),
                "duty of care in negligence",
                Metadata::new(),
            )
            .await
            .unwrap();

        let hits = store
            .query(
                "cases",
                "duty of care in negligence",
                &QueryOptions::new().with_threshold(0.99),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_cancelled_query() {
        let store = store();
        store.get_or_create_collection("cases").await.unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = store
            .query_cancellable("cases", "q", &QueryOptions::default(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Cancelled));
    }

    #[test]
    fn test_metadata_with() {
        let metadata = metadata_with(&["contract".to_string()], Some("2023-01-01"));
        assert_eq!(metadata["tags"], json!(["contract"]));
        assert_eq!(metadata["case_date"], json!("2023-01-01"));
        assert!(metadata_with(&[], None).is_empty());
    }
}
