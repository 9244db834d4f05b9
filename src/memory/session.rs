// src/memory/session.rs
// Session state: conversation count within a session

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::TenantKey;
use crate::storage::sqlite::PrimaryStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub conversation_count: i64,
    pub is_first_conversation: bool,
}

/// Compute session state for the pipeline. Missing session id yields None;
/// store failures degrade to None with a warning.
pub async fn compute_session_state(
    primary: &Arc<PrimaryStore>,
    tenant: &TenantKey,
    session_id: Option<&str>,
) -> Option<SessionState> {
    let session_id = session_id?;

    match primary
        .count_conversations_in_session(tenant, session_id)
        .await
    {
        Ok(count) => Some(SessionState {
            session_id: session_id.to_string(),
            conversation_count: count,
            is_first_conversation: count <= 1,
        }),
        Err(e) => {
            warn!(
                "Failed to compute session state for {}: {}",
                session_id, e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn counts_session_conversations() {
        let pool = SqlitePoolOptions::new()
            .connect(":memory:")
            .await
            .unwrap();
        let store = Arc::new(PrimaryStore::new(pool));
        store.run_migrations().await.unwrap();

        let tenant = TenantKey::new("u", "p");
        store
            .insert_conversation(&tenant, "c1", "gpt", Some("s1"), &serde_json::json!([]))
            .await
            .unwrap();

        let state = compute_session_state(&store, &tenant, Some("s1"))
            .await
            .unwrap();
        assert_eq!(state.conversation_count, 1);
        assert!(state.is_first_conversation);

        assert!(compute_session_state(&store, &tenant, None).await.is_none());
    }
}
