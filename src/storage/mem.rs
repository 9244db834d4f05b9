// src/storage/mem.rs
// In-memory vector index, used when no Qdrant URL is configured

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{MetadataFilter, SearchHit, VectorIndex, VectorRecord, similarity_from_cosine};
use crate::error::Result;

/// Brute-force cosine index over per-collection hash maps. Keeps the same
/// collection isolation and filter semantics as the Qdrant backend, which
/// makes it a drop-in for local runs and tests.
pub struct MemoryVectorIndex {
    collections: RwLock<HashMap<String, HashMap<i64, VectorRecord>>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn matches(record: &VectorRecord, filter: &MetadataFilter) -> bool {
        filter
            .iter()
            .all(|(key, value)| record.metadata.get(key) == Some(value))
    }

    fn in_window(record: &VectorRecord, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        match record.metadata.get("created_at_ts").and_then(Value::as_i64) {
            Some(ts) => ts >= start.timestamp() && ts <= end.timestamp(),
            None => false,
        }
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
        filter: &MetadataFilter,
    ) -> Vec<SearchHit> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Vec::new();
        };

        let mut hits: Vec<SearchHit> = records
            .values()
            .filter(|r| Self::matches(r, filter))
            .filter(|r| match window {
                Some((start, end)) => Self::in_window(r, start, end),
                None => true,
            })
            .map(|r| SearchHit {
                id: r.id,
                similarity: similarity_from_cosine(cosine(query, &r.embedding)),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(record.id, record);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>> {
        Ok(self.search(collection, query, k, None, filter).await)
    }

    async fn query_by_time(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>> {
        Ok(self
            .search(collection, query, k, Some((start, end)), filter)
            .await)
    }

    async fn get(&self, collection: &str, id: i64) -> Result<Option<SearchHit>> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|records| {
            records.get(&id).map(|r| SearchHit {
                id: r.id,
                similarity: 1.0,
                document: r.document.clone(),
                metadata: r.metadata.clone(),
            })
        }))
    }

    async fn delete(&self, collection: &str, id: i64) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(records) = collections.get_mut(collection) {
            records.remove(&id);
        }
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|r| r.len() as u64)
            .unwrap_or(0))
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
