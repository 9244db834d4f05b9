// src/api/http/router.rs
// HTTP router composition for REST API endpoints

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use super::{
    handlers::{health_handler, world_view_handler},
    ingest::{store_conversation, store_memory_log, store_mental_note},
    memory::fetch_memory,
};
use crate::state::AppState;

/// Main HTTP router for the memory service.
pub fn http_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/health", get(health_handler))
        // Memory query
        .route("/fetch-memory", post(fetch_memory))
        // World view
        .route("/world-view", get(world_view_handler))
        // Writers (insert + stored-event publish)
        .route("/conversations", post(store_conversation))
        .route("/memory-logs", post(store_memory_log))
        .route("/mental-notes", post(store_mental_note))
        .with_state(app_state)
}
