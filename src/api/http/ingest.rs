// src/api/http/ingest.rs
// Writer endpoints: primary-store insert + stored-event publish

use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult, IntoApiError};
use crate::api::types::{
    StoreConversationRequest, StoreMemoryLogRequest, StoreMentalNoteRequest, StoredOk,
};
use crate::events::{
    TOPIC_CONVERSATION_STORED, TOPIC_MEMORY_LOG_STORED, TOPIC_MENTAL_NOTE_STORED,
};
use crate::memory::types::TenantKey;
use crate::state::AppState;

/// POST /conversations
pub async fn store_conversation(
    State(app): State<Arc<AppState>>,
    Json(request): Json<StoreConversationRequest>,
) -> ApiResult<impl IntoResponse> {
    require_tenant(&request.user_id, &request.project_id)?;

    let tenant = TenantKey::new(request.user_id.clone(), request.project_id.clone());
    let conversation_id = request
        .conversation_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let model = request.model.unwrap_or_default();

    let row = app
        .primary
        .insert_conversation(
            &tenant,
            &conversation_id,
            &model,
            request.session_id.as_deref(),
            &request.raw_data,
        )
        .await
        .into_api_error("Failed to store conversation")?;

    app.event_bus.publish(
        TOPIC_CONVERSATION_STORED,
        json!({
            "conversation_db_id": row.id,
            "conversation_id": row.conversation_id,
            "model": row.model,
            "raw_data": row.raw_data,
            "user_id": row.user_id,
            "project_id": row.project_id,
            "session_id": row.session_id,
            "created_at": row.created_at,
        }),
    );

    info!(id = row.id, "Conversation stored, vector ingestion scheduled");
    Ok(Json(StoredOk { ok: true, id: row.id }))
}

/// POST /memory-logs
pub async fn store_memory_log(
    State(app): State<Arc<AppState>>,
    Json(request): Json<StoreMemoryLogRequest>,
) -> ApiResult<impl IntoResponse> {
    require_tenant(&request.user_id, &request.project_id)?;
    if request.raw_data.is_null() {
        return Err(ApiError::bad_request("raw_data must be non-empty"));
    }

    let tenant = TenantKey::new(request.user_id.clone(), request.project_id.clone());
    let agent = request.agent.unwrap_or_default();

    let row = app
        .primary
        .insert_memory_log(&tenant, &request.task, &agent, &request.raw_data)
        .await
        .into_api_error("Failed to store memory log")?;

    app.event_bus.publish(
        TOPIC_MEMORY_LOG_STORED,
        json!({
            "memory_log_id": row.id,
            "task": row.task,
            "agent": row.agent,
            "date": row.created_at,
            "raw_data": row.raw_data,
            "user_id": row.user_id,
            "project_id": row.project_id,
        }),
    );

    info!(id = row.id, "Memory log stored, vector ingestion scheduled");
    Ok(Json(StoredOk { ok: true, id: row.id }))
}

/// POST /mental-notes
pub async fn store_mental_note(
    State(app): State<Arc<AppState>>,
    Json(request): Json<StoreMentalNoteRequest>,
) -> ApiResult<impl IntoResponse> {
    require_tenant(&request.user_id, &request.project_id)?;
    if request.session_id.trim().is_empty() {
        return Err(ApiError::bad_request("session_id is required"));
    }

    let tenant = TenantKey::new(request.user_id.clone(), request.project_id.clone());
    let start_time = request
        .start_time
        .unwrap_or_else(|| Utc::now().timestamp_millis());

    let row = app
        .primary
        .insert_mental_note(&tenant, &request.session_id, start_time, &request.raw_data)
        .await
        .into_api_error("Failed to store mental note")?;

    app.event_bus.publish(
        TOPIC_MENTAL_NOTE_STORED,
        json!({
            "mental_note_id": row.id,
            "session_id": row.session_id,
            "start_time": row.start_time,
            "raw_data": row.raw_data,
            "user_id": row.user_id,
            "project_id": row.project_id,
        }),
    );

    info!(id = row.id, "Mental note stored, vector ingestion scheduled");
    Ok(Json(StoredOk { ok: true, id: row.id }))
}

fn require_tenant(user_id: &str, project_id: &str) -> Result<(), ApiError> {
    if user_id.trim().is_empty() || project_id.trim().is_empty() {
        return Err(ApiError::bad_request("user_id and project_id are required"));
    }
    Ok(())
}
