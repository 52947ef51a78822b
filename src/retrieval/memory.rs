//! In-process vector index with brute-force cosine search

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CollectionKey, Document, Neighbor, VectorIndex};
use crate::embeddings::cosine_distance;
use crate::error::StorageResult;

/// Collections held in memory; documents keep their first insertion position.
#[derive(Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<CollectionKey, Vec<Document>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn has_collection(&self, key: &CollectionKey) -> StorageResult<bool> {
        Ok(self.collections.read().await.contains_key(key))
    }

    async fn ensure_collection(&self, key: &CollectionKey) -> StorageResult<()> {
        self.collections
            .write()
            .await
            .entry(key.clone())
            .or_default();
        Ok(())
    }

    async fn list_collections(&self, client: &str) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .await
            .keys()
            .filter(|k| k.client == client)
            .map(|k| k.collection.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn upsert(&self, key: &CollectionKey, document: Document) -> StorageResult<()> {
        let mut collections = self.collections.write().await;
        let documents = collections.entry(key.clone()).or_default();
        match documents.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }
        Ok(())
    }

    async fn search(
        &self,
        key: &CollectionKey,
        vector: &[f32],
        limit: usize,
        tags: Option<&BTreeSet<String>>,
    ) -> StorageResult<Vec<Neighbor>> {
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(key) else {
            return Ok(Vec::new());
        };

        let mut neighbors: Vec<Neighbor> = documents
            .iter()
            .filter(|d| tags.map_or(true, |t| d.has_any_tag(t)))
            .map(|d| Neighbor {
                distance: cosine_distance(vector, &d.embedding),
                document: d.clone(),
            })
            .collect();

        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(limit);
        Ok(neighbors)
    }
}
