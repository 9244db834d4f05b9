// src/events/handlers/memory_log.rs
// memory_log.stored -> embed -> vector upsert -> embedding backfill

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::IngestionDeps;
use crate::events::{Event, EventSubscriber, MemoryLogStored};
use crate::memory::normalize::memory_log_searchable_text;
use crate::memory::types::{MemoryLogData, TenantKey};
use crate::storage::collections::{SourceKind, collection_name};
use crate::storage::{VectorRecord, record_metadata};

pub struct MemoryLogHandler {
    deps: Arc<IngestionDeps>,
}

impl MemoryLogHandler {
    pub fn new(deps: Arc<IngestionDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl EventSubscriber for MemoryLogHandler {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        let payload: MemoryLogStored = match serde_json::from_value(event.payload) {
            Ok(p) => p,
            Err(e) => {
                warn!("[memory_log] invalid event payload: {}", e);
                return Ok(());
            }
        };

        if payload.user_id.trim().is_empty() || payload.project_id.trim().is_empty() {
            warn!("[memory_log] missing tenant key, skipping");
            return Ok(());
        }
        if payload.raw_data.is_null() {
            warn!(
                "[memory_log] empty raw_data for id {}, skipping",
                payload.memory_log_id
            );
            return Ok(());
        }

        let tenant = TenantKey::new(payload.user_id.clone(), payload.project_id.clone());
        let data: MemoryLogData =
            serde_json::from_value(payload.raw_data.clone()).unwrap_or_default();
        let text = memory_log_searchable_text(&data);

        info!(
            "[memory_log] processing id {} (user: {}, project: {})",
            payload.memory_log_id, tenant.user_id, tenant.project_id
        );

        let embedding = match self.deps.embeddings.embed(&text, None).await {
            Ok(response) => response.embedding,
            Err(e) => {
                self.deps.record_error();
                return Err(anyhow::anyhow!(
                    "embed failed for memory log {}: {e}",
                    payload.memory_log_id
                ));
            }
        };

        let created_at = payload
            .date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let mut metadata = record_metadata(&tenant, SourceKind::MemoryLog, created_at);
        metadata.insert("task".into(), json!(payload.task));
        metadata.insert("agent".into(), json!(payload.agent));

        let collection = collection_name(&tenant, SourceKind::MemoryLog);
        let record = VectorRecord {
            id: payload.memory_log_id,
            embedding: embedding.clone(),
            document: json!({
                "memory_log_id": payload.memory_log_id,
                "user_id": tenant.user_id,
                "project_id": tenant.project_id,
                "raw_data": payload.raw_data,
            }),
            metadata,
        };

        if let Err(e) = self.deps.vectors.upsert(&collection, record).await {
            self.deps.record_error();
            return Err(anyhow::anyhow!(
                "vector upsert failed for memory log {}: {e}",
                payload.memory_log_id
            ));
        }

        info!(
            "[memory_log] vector stored for id {} in {}",
            payload.memory_log_id, collection
        );

        // Backfill is best-effort: the vector store is authoritative for
        // search, the primary-store column is an optimization.
        if let Err(e) = self
            .deps
            .primary
            .update_memory_log_embedding(payload.memory_log_id, &embedding)
            .await
        {
            warn!(
                "[memory_log] embedding backfill failed for id {}: {}",
                payload.memory_log_id, e
            );
        }

        Ok(())
    }
}
