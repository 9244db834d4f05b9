// src/storage/qdrant.rs
// Qdrant-backed vector index with per-tenant collections

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    GetPointsBuilder, PointId, PointStruct, Range, ScoredPoint, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{MetadataFilter, SearchHit, VectorIndex, VectorRecord, similarity_from_cosine};
use crate::error::{MemoryError, Result};

/// Payload key holding the JSON-encoded source document.
const DOCUMENT_KEY: &str = "document";

/// Qdrant vector index. Collections are created lazily on first upsert with
/// cosine distance; tenant isolation is by collection, so queries never need
/// tenant filters.
pub struct QdrantIndex {
    client: Qdrant,
    dimensions: u64,
    known_collections: RwLock<HashSet<String>>,
}

impl QdrantIndex {
    pub fn new(url: &str, dimensions: usize) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| MemoryError::VectorStore(format!("failed to connect to Qdrant: {e}")))?;

        Ok(Self {
            client,
            dimensions: dimensions as u64,
            known_collections: RwLock::new(HashSet::new()),
        })
    }

    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        if self.known_collections.read().await.contains(collection) {
            return Ok(());
        }

        let exists = self
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;

        if !exists {
            info!("Creating Qdrant collection: {}", collection);
            let create = self
                .client
                .create_collection(
                    CreateCollectionBuilder::new(collection).vectors_config(
                        VectorParamsBuilder::new(self.dimensions, Distance::Cosine),
                    ),
                )
                .await;

            if let Err(e) = create {
                // Another process may have created it between the exists
                // check and the create call.
                if !e.to_string().contains("already exists") {
                    return Err(MemoryError::VectorStore(format!(
                        "failed to create collection {collection}: {e}"
                    )));
                }
                debug!("Collection {} already exists", collection);
            }
        }

        self.known_collections
            .write()
            .await
            .insert(collection.to_string());
        Ok(())
    }

    fn build_filter(filter: &MetadataFilter, window: Option<(DateTime<Utc>, DateTime<Utc>)>) -> Option<Filter> {
        let mut conditions: Vec<Condition> = Vec::new();

        for (key, value) in filter {
            let condition = match value {
                Value::String(s) => Condition::matches(key.clone(), s.clone()),
                Value::Number(n) if n.is_i64() => {
                    Condition::matches(key.clone(), n.as_i64().unwrap_or_default())
                }
                Value::Bool(b) => Condition::matches(key.clone(), *b),
                other => Condition::matches(key.clone(), other.to_string()),
            };
            conditions.push(condition);
        }

        if let Some((start, end)) = window {
            conditions.push(Condition::range(
                "created_at_ts",
                Range {
                    gte: Some(start.timestamp() as f64),
                    lte: Some(end.timestamp() as f64),
                    gt: None,
                    lt: None,
                },
            ));
        }

        if conditions.is_empty() {
            None
        } else {
            Some(Filter::must(conditions))
        }
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>> {
        let exists = self
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
        if !exists {
            // No vectors ingested for this tenant yet.
            return Ok(Vec::new());
        }

        let mut builder =
            SearchPointsBuilder::new(collection, query.to_vec(), k as u64).with_payload(true);
        if let Some(filter) = Self::build_filter(filter, window) {
            builder = builder.filter(filter);
        }

        let results = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| MemoryError::VectorStore(format!("search failed: {e}")))?;

        Ok(results.result.into_iter().filter_map(scored_to_hit).collect())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<()> {
        self.ensure_collection(collection).await?;

        let mut payload: HashMap<String, QdrantValue> = HashMap::new();
        payload.insert(DOCUMENT_KEY.to_string(), record.document.to_string().into());
        for (key, value) in &record.metadata {
            payload.insert(key.clone(), json_to_qdrant(value));
        }

        let point = PointStruct::new(record.id as u64, record.embedding, payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, vec![point]).wait(true))
            .await
            .map_err(|e| MemoryError::VectorStore(format!("upsert failed: {e}")))?;

        debug!("Upserted point {} into {}", record.id, collection);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>> {
        self.search(collection, query, k, None, filter).await
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
        self.search(collection, query, k, Some((start, end)), filter)
            .await
    }

    async fn get(&self, collection: &str, id: i64) -> Result<Option<SearchHit>> {
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(collection, vec![PointId::from(id as u64)])
                    .with_payload(true),
            )
            .await
            .map_err(|e| MemoryError::VectorStore(format!("get failed: {e}")))?;

        Ok(response.result.into_iter().next().map(|point| {
            let (document, metadata) = split_payload(point.payload);
            SearchHit {
                id,
                similarity: 1.0,
                document,
                metadata,
            }
        }))
    }

    async fn delete(&self, collection: &str, id: i64) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(vec![PointId::from(id as u64)])
                    .wait(true),
            )
            .await
            .map_err(|e| MemoryError::VectorStore(format!("delete failed: {e}")))?;
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let exists = self
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
        if !exists {
            return Ok(0);
        }

        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(|e| MemoryError::VectorStore(format!("count failed: {e}")))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}

fn scored_to_hit(point: ScoredPoint) -> Option<SearchHit> {
    let id = match point.id.as_ref()?.point_id_options.as_ref()? {
        qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => *n as i64,
        qdrant_client::qdrant::point_id::PointIdOptions::Uuid(_) => return None,
    };

    let (document, metadata) = split_payload(point.payload);

    Some(SearchHit {
        id,
        similarity: similarity_from_cosine(point.score),
        document,
        metadata,
    })
}

/// Split a Qdrant payload back into (document, metadata).
fn split_payload(
    payload: HashMap<String, QdrantValue>,
) -> (Value, serde_json::Map<String, Value>) {
    let mut document = Value::Null;
    let mut metadata = serde_json::Map::new();

    for (key, value) in payload {
        if key == DOCUMENT_KEY {
            if let Some(s) = value.as_str() {
                document = serde_json::from_str(s).unwrap_or(Value::Null);
            }
        } else if let Some(json) = qdrant_to_json(&value) {
            metadata.insert(key, json);
        }
    }

    (document, metadata)
}

fn json_to_qdrant(value: &Value) -> QdrantValue {
    match value {
        Value::String(s) => s.clone().into(),
        Value::Number(n) if n.is_i64() => n.as_i64().unwrap_or_default().into(),
        Value::Number(n) => n.as_f64().unwrap_or_default().into(),
        Value::Bool(b) => (*b).into(),
        other => other.to_string().into(),
    }
}

fn qdrant_to_json(value: &QdrantValue) -> Option<Value> {
    if let Some(s) = value.as_str() {
        Some(Value::String(s.to_string()))
    } else if let Some(i) = value.as_integer() {
        Some(Value::Number(i.into()))
    } else if let Some(f) = value.as_double() {
        serde_json::Number::from_f64(f).map(Value::Number)
    } else {
        value.as_bool().map(Value::Bool)
    }
}
