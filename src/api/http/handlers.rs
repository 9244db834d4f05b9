// src/api/http/handlers.rs
// Health and world-view handlers

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::api::error::{ApiResult, IntoApiError};
use crate::api::types::WorldViewQuery;
use crate::memory::types::TenantKey;
use crate::state::AppState;

/// GET /health
pub async fn health_handler(State(app): State<Arc<AppState>>) -> impl IntoResponse {
    let provider = app.embeddings.health().await;

    Json(json!({
        "status": provider.status,
        "version": env!("CARGO_PKG_VERSION"),
        "embedding_provider": provider,
        "cache": app.embeddings.cache_stats(),
        "ingestion_errors": app.ingestion.error_count(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// GET /world-view
pub async fn world_view_handler(
    State(app): State<Arc<AppState>>,
    Query(params): Query<WorldViewQuery>,
) -> ApiResult<impl IntoResponse> {
    let tenant = TenantKey::new(params.user_id, params.project_id);
    let view = app
        .world_view
        .build(
            &tenant,
            params.session_id.as_deref(),
            params.summarize.unwrap_or(false),
        )
        .await
        .into_api_error("Failed to build world view")?;

    Ok(Json(view))
}
