// src/api/types.rs
// Request/response types for the HTTP surface

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// POST /fetch-memory request body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchMemoryRequest {
    pub query: String,
    pub user_id: String,
    pub project_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_similarity: Option<f32>,
    #[serde(default)]
    pub model: Option<String>,
}

/// POST /fetch-memory response body.
#[derive(Debug, Clone, Serialize)]
pub struct FetchMemoryResponse {
    pub memory: String,
}

/// POST /conversations request body. The turn list lands in raw_data as-is.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConversationRequest {
    pub user_id: String,
    pub project_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub raw_data: Value,
}

/// POST /memory-logs request body.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreMemoryLogRequest {
    pub user_id: String,
    pub project_id: String,
    pub task: String,
    #[serde(default)]
    pub agent: Option<String>,
    pub raw_data: Value,
}

/// POST /mental-notes request body.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreMentalNoteRequest {
    pub user_id: String,
    pub project_id: String,
    pub session_id: String,
    #[serde(default)]
    pub start_time: Option<i64>,
    pub raw_data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredOk {
    pub ok: bool,
    pub id: i64,
}

/// GET /world-view query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldViewQuery {
    pub user_id: String,
    pub project_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub summarize: Option<bool>,
}
