// src/storage/mod.rs
// Storage layer: primary store (SQLite) + vector store (Qdrant or in-memory)

pub mod collections;
pub mod mem;
pub mod qdrant;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;
use crate::memory::types::TenantKey;
use collections::SourceKind;

/// A record in a vector collection: stable id, embedding, the denormalized
/// source document, and a flat metadata map.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: i64,
    pub embedding: Vec<f32>,
    pub document: Value,
    pub metadata: serde_json::Map<String, Value>,
}

/// One similarity hit. `similarity` is already mapped into [0, 1].
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: i64,
    pub similarity: f32,
    pub document: Value,
    pub metadata: serde_json::Map<String, Value>,
}

/// A conjunction of equality predicates on metadata keys.
pub type MetadataFilter = Vec<(String, Value)>;

/// Vector store operations. Upserts are idempotent by id; per-tenant
/// isolation comes from the collection naming, not from filters.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<()>;

    /// Top-k by similarity, descending, optionally filtered.
    async fn query(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>>;

    /// Same as `query` with an inclusive window ANDed against the record
    /// creation time.
    async fn query_by_time(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>>;

    async fn get(&self, collection: &str, id: i64) -> Result<Option<SearchHit>>;

    async fn delete(&self, collection: &str, id: i64) -> Result<()>;

    async fn count(&self, collection: &str) -> Result<u64>;
}

/// The one distance-to-similarity mapping for this deployment: the index
/// computes cosine similarity, the exposed score is clamped into [0, 1]
/// (equivalently 1 - d for cosine distance d). Monotone with semantic
/// similarity.
pub fn similarity_from_cosine(cosine: f32) -> f32 {
    cosine.clamp(0.0, 1.0)
}

/// Build the required metadata for a vector record: tenant key, source kind,
/// ISO-8601 creation time plus the numeric epoch used for range gating.
pub fn record_metadata(
    tenant: &TenantKey,
    kind: SourceKind,
    created_at: DateTime<Utc>,
) -> serde_json::Map<String, Value> {
    let mut metadata = serde_json::Map::new();
    metadata.insert("user_id".into(), Value::String(tenant.user_id.clone()));
    metadata.insert(
        "project_id".into(),
        Value::String(tenant.project_id.clone()),
    );
    metadata.insert("source_kind".into(), Value::String(kind.as_str().into()));
    metadata.insert("created_at".into(), Value::String(created_at.to_rfc3339()));
    metadata.insert(
        "created_at_ts".into(),
        Value::Number(created_at.timestamp().into()),
    );
    metadata
}
