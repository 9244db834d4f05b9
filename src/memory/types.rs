// src/memory/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The pair that scopes all per-user/project state. No global view exists
/// across tenants except diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantKey {
    pub user_id: String,
    pub project_id: String,
}

impl TenantKey {
    pub fn new(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: project_id.into(),
        }
    }
}

/// Structured memory-log body. Known fields are typed; everything else
/// lands in the residual metadata map (additive schema evolution).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryLogData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<SolutionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolutionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approach: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_changes: Vec<String>,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, Value>,
}

/// Structured mental-note body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MentalNoteData {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_type: Option<String>,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, Value>,
}

/// A memory log row in the primary store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLogRow {
    pub id: i64,
    pub user_id: String,
    pub project_id: String,
    pub task: String,
    pub agent: String,
    pub created_at: DateTime<Utc>,
    pub raw_data: Value,
    pub embedding: Option<Vec<f32>>,
}

/// A mental note row in the primary store. `start_time` groups notes within
/// a conversation and is a millisecond epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentalNoteRow {
    pub id: i64,
    pub user_id: String,
    pub project_id: String,
    pub session_id: String,
    pub start_time: i64,
    pub raw_data: Value,
    pub embedding: Option<Vec<f32>>,
}

/// A conversation row in the primary store. Conversation embeddings live
/// only in the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRow {
    pub id: i64,
    pub conversation_id: String,
    pub user_id: String,
    pub project_id: String,
    pub session_id: Option<String>,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub raw_data: Value,
}

/// One normalized user/assistant exchange extracted from a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnPair {
    pub user: String,
    pub assistant: String,
    pub metadata: TurnMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub timestamp: Option<String>,
    pub conversation_id: String,
    pub source: String,
}

/// A normalized retrieval hit handed back to the pipeline caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedMemory {
    pub source: String,
    pub similarity: f32,
    pub conversation_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub user_id: String,
    pub project_id: String,
    pub turns: Vec<TurnPair>,
    pub topic: Option<String>,
    pub required_item: String,
}
