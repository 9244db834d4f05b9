// src/events/handlers/conversation.rs
// conversation.stored -> embed -> vector upsert (no primary-store backfill)

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use super::IngestionDeps;
use crate::events::{ConversationStored, Event, EventSubscriber};
use crate::memory::normalize::conversation_embedding_text;
use crate::memory::types::{ConversationRow, TenantKey};
use crate::storage::collections::{SourceKind, collection_name};
use crate::storage::{VectorRecord, record_metadata};

pub struct ConversationHandler {
    deps: Arc<IngestionDeps>,
}

impl ConversationHandler {
    pub fn new(deps: Arc<IngestionDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl EventSubscriber for ConversationHandler {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        let payload: ConversationStored = match serde_json::from_value(event.payload) {
            Ok(p) => p,
            Err(e) => {
                warn!("[conversation] invalid event payload: {}", e);
                return Ok(());
            }
        };

        if payload.user_id.trim().is_empty() || payload.project_id.trim().is_empty() {
            warn!("[conversation] missing tenant key, skipping");
            return Ok(());
        }

        let tenant = TenantKey::new(payload.user_id.clone(), payload.project_id.clone());
        let created_at = payload.created_at.unwrap_or_else(Utc::now);

        let row = ConversationRow {
            id: payload.conversation_db_id,
            conversation_id: payload.conversation_id.clone(),
            user_id: tenant.user_id.clone(),
            project_id: tenant.project_id.clone(),
            session_id: payload.session_id.clone(),
            model: payload.model.clone(),
            created_at,
            raw_data: payload.raw_data.clone(),
        };

        let Some(text) = conversation_embedding_text(&row, Some(&self.deps.compressor)) else {
            warn!(
                "[conversation] no usable turns for id {}, skipping",
                payload.conversation_db_id
            );
            return Ok(());
        };

        info!(
            "[conversation] processing id {} ({})",
            payload.conversation_db_id, payload.conversation_id
        );

        let embedding = match self.deps.embeddings.embed(&text, None).await {
            Ok(response) => response.embedding,
            Err(e) => {
                self.deps.record_error();
                return Err(anyhow::anyhow!(
                    "embed failed for conversation {}: {e}",
                    payload.conversation_db_id
                ));
            }
        };

        let mut metadata = record_metadata(&tenant, SourceKind::Conversation, created_at);
        metadata.insert("conversation_id".into(), json!(payload.conversation_id));
        metadata.insert("model".into(), json!(payload.model));
        if let Some(session_id) = &payload.session_id {
            metadata.insert("session_id".into(), json!(session_id));
        }

        let collection = collection_name(&tenant, SourceKind::Conversation);
        let record = VectorRecord {
            id: payload.conversation_db_id,
            embedding,
            document: json!({
                "conversation_db_id": payload.conversation_db_id,
                "conversation_id": payload.conversation_id,
                "model": payload.model,
                "session_id": payload.session_id,
                "user_id": tenant.user_id,
                "project_id": tenant.project_id,
                "created_at": created_at.to_rfc3339(),
                "raw_data": payload.raw_data,
            }),
            metadata,
        };

        if let Err(e) = self.deps.vectors.upsert(&collection, record).await {
            self.deps.record_error();
            return Err(anyhow::anyhow!(
                "vector upsert failed for conversation {}: {e}",
                payload.conversation_db_id
            ));
        }

        info!(
            "[conversation] vector stored for id {} in {}",
            payload.conversation_db_id, collection
        );

        // Conversations keep embeddings only in the vector store.
        debug!(
            "[conversation] skipping primary-store embedding backfill for id {}",
            payload.conversation_db_id
        );

        Ok(())
    }
}
