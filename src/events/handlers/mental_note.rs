// src/events/handlers/mental_note.rs
// mental_note.stored -> embed -> vector upsert -> embedding backfill

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::IngestionDeps;
use crate::events::{Event, EventSubscriber, MentalNoteStored};
use crate::memory::normalize::mental_note_searchable_text;
use crate::memory::types::{MentalNoteData, TenantKey};
use crate::storage::collections::{SourceKind, collection_name};
use crate::storage::{VectorRecord, record_metadata};

pub struct MentalNoteHandler {
    deps: Arc<IngestionDeps>,
}

impl MentalNoteHandler {
    pub fn new(deps: Arc<IngestionDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl EventSubscriber for MentalNoteHandler {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        let payload: MentalNoteStored = match serde_json::from_value(event.payload) {
            Ok(p) => p,
            Err(e) => {
                warn!("[mental_note] invalid event payload: {}", e);
                return Ok(());
            }
        };

        if payload.user_id.trim().is_empty() || payload.project_id.trim().is_empty() {
            warn!("[mental_note] missing tenant key, skipping");
            return Ok(());
        }

        let tenant = TenantKey::new(payload.user_id.clone(), payload.project_id.clone());
        let data: MentalNoteData =
            serde_json::from_value(payload.raw_data.clone()).unwrap_or_default();
        let text = mental_note_searchable_text(&data);
        if text.is_empty() {
            warn!(
                "[mental_note] no content for id {}, skipping",
                payload.mental_note_id
            );
            return Ok(());
        }

        info!(
            "[mental_note] processing id {} (session: {})",
            payload.mental_note_id, payload.session_id
        );

        let embedding = match self.deps.embeddings.embed(&text, None).await {
            Ok(response) => response.embedding,
            Err(e) => {
                self.deps.record_error();
                return Err(anyhow::anyhow!(
                    "embed failed for mental note {}: {e}",
                    payload.mental_note_id
                ));
            }
        };

        let created_at = DateTime::<Utc>::from_timestamp_millis(payload.start_time)
            .unwrap_or_else(Utc::now);

        let mut metadata = record_metadata(&tenant, SourceKind::MentalNote, created_at);
        metadata.insert("session_id".into(), json!(payload.session_id));
        if let Some(note_type) = &data.note_type {
            metadata.insert("note_type".into(), json!(note_type));
        }

        let collection = collection_name(&tenant, SourceKind::MentalNote);
        let record = VectorRecord {
            id: payload.mental_note_id,
            embedding: embedding.clone(),
            document: json!({
                "mental_note_id": payload.mental_note_id,
                "session_id": payload.session_id,
                "user_id": tenant.user_id,
                "project_id": tenant.project_id,
                "raw_data": payload.raw_data,
            }),
            metadata,
        };

        if let Err(e) = self.deps.vectors.upsert(&collection, record).await {
            self.deps.record_error();
            return Err(anyhow::anyhow!(
                "vector upsert failed for mental note {}: {e}",
                payload.mental_note_id
            ));
        }

        info!(
            "[mental_note] vector stored for id {} in {}",
            payload.mental_note_id, collection
        );

        if let Err(e) = self
            .deps
            .primary
            .update_mental_note_embedding(payload.mental_note_id, &embedding)
            .await
        {
            warn!(
                "[mental_note] embedding backfill failed for id {}: {}",
                payload.mental_note_id, e
            );
        }

        Ok(())
    }
}
