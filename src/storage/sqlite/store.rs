// src/storage/sqlite/store.rs
// Primary store over SQLite

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::debug;

use super::logs::LogOperations;
use crate::memory::types::{ConversationRow, MemoryLogRow, MentalNoteRow, TenantKey};

/// Durable store of memory logs, mental notes, conversations, and the
/// pipeline's ICM/retrieval/request logs. Sources become visible to readers
/// immediately after insert; their vectors arrive later via the ingestion
/// handlers.
pub struct PrimaryStore {
    pub pool: SqlitePool,
    logs: LogOperations,
}

impl PrimaryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            logs: LogOperations::new(pool.clone()),
            pool,
        }
    }

    pub fn logs(&self) -> &LogOperations {
        &self.logs
    }

    pub async fn run_migrations(&self) -> Result<()> {
        super::schema::run_migrations(&self.pool).await
    }

    // =====================================
    // MEMORY LOGS
    // =====================================

    pub async fn insert_memory_log(
        &self,
        tenant: &TenantKey,
        task: &str,
        agent: &str,
        raw_data: &Value,
    ) -> Result<MemoryLogRow> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO memory_logs (user_id, project_id, task, agent, created_at, raw_data)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tenant.user_id)
        .bind(&tenant.project_id)
        .bind(task)
        .bind(agent)
        .bind(created_at)
        .bind(raw_data.to_string())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Inserted memory log {}", id);

        Ok(MemoryLogRow {
            id,
            user_id: tenant.user_id.clone(),
            project_id: tenant.project_id.clone(),
            task: task.to_string(),
            agent: agent.to_string(),
            created_at,
            raw_data: raw_data.clone(),
            embedding: None,
        })
    }

    pub async fn get_memory_log(&self, id: i64) -> Result<Option<MemoryLogRow>> {
        let row = sqlx::query("SELECT * FROM memory_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(memory_log_from_row))
    }

    /// Backfill the authoritative embedding column. The vector store remains
    /// authoritative for search; this column is an optimization.
    pub async fn update_memory_log_embedding(&self, id: i64, embedding: &[f32]) -> Result<()> {
        sqlx::query("UPDATE memory_logs SET embedding = ? WHERE id = ?")
            .bind(serde_json::to_string(embedding)?)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_memory_log(&self, tenant: &TenantKey, id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM memory_logs WHERE id = ? AND user_id = ? AND project_id = ?")
                .bind(id)
                .bind(&tenant.user_id)
                .bind(&tenant.project_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    // =====================================
    // MENTAL NOTES
    // =====================================

    pub async fn insert_mental_note(
        &self,
        tenant: &TenantKey,
        session_id: &str,
        start_time: i64,
        raw_data: &Value,
    ) -> Result<MentalNoteRow> {
        let result = sqlx::query(
            r#"
            INSERT INTO mental_notes (user_id, project_id, session_id, start_time, raw_data)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tenant.user_id)
        .bind(&tenant.project_id)
        .bind(session_id)
        .bind(start_time)
        .bind(raw_data.to_string())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Inserted mental note {}", id);

        Ok(MentalNoteRow {
            id,
            user_id: tenant.user_id.clone(),
            project_id: tenant.project_id.clone(),
            session_id: session_id.to_string(),
            start_time,
            raw_data: raw_data.clone(),
            embedding: None,
        })
    }

    pub async fn get_mental_note(&self, id: i64) -> Result<Option<MentalNoteRow>> {
        let row = sqlx::query("SELECT * FROM mental_notes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(mental_note_from_row))
    }

    pub async fn update_mental_note_embedding(&self, id: i64, embedding: &[f32]) -> Result<()> {
        sqlx::query("UPDATE mental_notes SET embedding = ? WHERE id = ?")
            .bind(serde_json::to_string(embedding)?)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =====================================
    // CONVERSATIONS
    // =====================================

    pub async fn insert_conversation(
        &self,
        tenant: &TenantKey,
        conversation_id: &str,
        model: &str,
        session_id: Option<&str>,
        raw_data: &Value,
    ) -> Result<ConversationRow> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO conversations
                (conversation_id, user_id, project_id, session_id, model, created_at, raw_data)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(conversation_id)
        .bind(&tenant.user_id)
        .bind(&tenant.project_id)
        .bind(session_id)
        .bind(model)
        .bind(created_at)
        .bind(raw_data.to_string())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Inserted conversation {} ({})", id, conversation_id);

        Ok(ConversationRow {
            id,
            conversation_id: conversation_id.to_string(),
            user_id: tenant.user_id.clone(),
            project_id: tenant.project_id.clone(),
            session_id: session_id.map(String::from),
            model: model.to_string(),
            created_at,
            raw_data: raw_data.clone(),
        })
    }

    pub async fn get_conversation(&self, id: i64) -> Result<Option<ConversationRow>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(conversation_from_row))
    }

    /// Most recent conversations for a tenant, newest first.
    pub async fn recent_conversations(
        &self,
        tenant: &TenantKey,
        limit: usize,
    ) -> Result<Vec<ConversationRow>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM conversations
            WHERE user_id = ? AND project_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(&tenant.user_id)
        .bind(&tenant.project_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(conversation_from_row).collect())
    }

    /// Conversations inside an inclusive window, used as the time-only fetch
    /// that hard-gates windowed retrieval.
    pub async fn conversations_in_range(
        &self,
        tenant: &TenantKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ConversationRow>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM conversations
            WHERE user_id = ? AND project_id = ?
              AND created_at >= ? AND created_at <= ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(&tenant.user_id)
        .bind(&tenant.project_id)
        .bind(start)
        .bind(end)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(conversation_from_row).collect())
    }

    pub async fn count_conversations(&self, tenant: &TenantKey) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM conversations WHERE user_id = ? AND project_id = ?",
        )
        .bind(&tenant.user_id)
        .bind(&tenant.project_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    pub async fn count_conversations_in_session(
        &self,
        tenant: &TenantKey,
        session_id: &str,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM conversations
            WHERE session_id = ? AND user_id = ? AND project_id = ?
            "#,
        )
        .bind(session_id)
        .bind(&tenant.user_id)
        .bind(&tenant.project_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }
}

fn parse_embedding(raw: Option<String>) -> Option<Vec<f32>> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn parse_raw_data(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::Null)
}

fn memory_log_from_row(row: SqliteRow) -> MemoryLogRow {
    MemoryLogRow {
        id: row.get("id"),
        user_id: row.get("user_id"),
        project_id: row.get("project_id"),
        task: row.get("task"),
        agent: row.get("agent"),
        created_at: row.get("created_at"),
        raw_data: parse_raw_data(row.get("raw_data")),
        embedding: parse_embedding(row.get("embedding")),
    }
}

fn mental_note_from_row(row: SqliteRow) -> MentalNoteRow {
    MentalNoteRow {
        id: row.get("id"),
        user_id: row.get("user_id"),
        project_id: row.get("project_id"),
        session_id: row.get("session_id"),
        start_time: row.get("start_time"),
        raw_data: parse_raw_data(row.get("raw_data")),
        embedding: parse_embedding(row.get("embedding")),
    }
}

fn conversation_from_row(row: SqliteRow) -> ConversationRow {
    ConversationRow {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        user_id: row.get("user_id"),
        project_id: row.get("project_id"),
        session_id: row.get("session_id"),
        model: row.get("model"),
        created_at: row.get("created_at"),
        raw_data: parse_raw_data(row.get("raw_data")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> PrimaryStore {
        let pool = SqlitePoolOptions::new()
            .connect(":memory:")
            .await
            .unwrap();
        let store = PrimaryStore::new(pool);
        store.run_migrations().await.unwrap();
        store
    }

    #[tokio::test]
    async fn memory_log_round_trip_with_embedding_backfill() {
        let store = test_store().await;
        let tenant = TenantKey::new("u", "p");

        let raw = serde_json::json!({ "task": "fix auth", "tags": ["auth"] });
        let inserted = store
            .insert_memory_log(&tenant, "fix auth", "claude", &raw)
            .await
            .unwrap();

        let fetched = store.get_memory_log(inserted.id).await.unwrap().unwrap();
        assert_eq!(fetched.task, "fix auth");
        assert!(fetched.embedding.is_none());

        store
            .update_memory_log_embedding(inserted.id, &[0.5, 0.25])
            .await
            .unwrap();
        let fetched = store.get_memory_log(inserted.id).await.unwrap().unwrap();
        assert_eq!(fetched.embedding, Some(vec![0.5, 0.25]));
    }

    #[tokio::test]
    async fn recent_conversations_newest_first() {
        let store = test_store().await;
        let tenant = TenantKey::new("u", "p");

        for i in 0..3 {
            store
                .insert_conversation(
                    &tenant,
                    &format!("conv-{i}"),
                    "gpt",
                    Some("s1"),
                    &serde_json::json!([]),
                )
                .await
                .unwrap();
        }

        let recent = store.recent_conversations(&tenant, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].conversation_id, "conv-2");
        assert_eq!(store.count_conversations(&tenant).await.unwrap(), 3);
        assert_eq!(
            store
                .count_conversations_in_session(&tenant, "s1")
                .await
                .unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn range_query_excludes_outside_window() {
        let store = test_store().await;
        let tenant = TenantKey::new("u", "p");
        store
            .insert_conversation(&tenant, "c1", "gpt", None, &serde_json::json!([]))
            .await
            .unwrap();

        let far_past_start = Utc::now() - chrono::Duration::days(30);
        let far_past_end = Utc::now() - chrono::Duration::days(29);
        let hits = store
            .conversations_in_range(&tenant, far_past_start, far_past_end, 10)
            .await
            .unwrap();
        assert!(hits.is_empty());

        let now_start = Utc::now() - chrono::Duration::hours(1);
        let now_end = Utc::now() + chrono::Duration::hours(1);
        let hits = store
            .conversations_in_range(&tenant, now_start, now_end, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn tenant_scoping_on_reads() {
        let store = test_store().await;
        store
            .insert_conversation(
                &TenantKey::new("u1", "p1"),
                "c1",
                "gpt",
                None,
                &serde_json::json!([]),
            )
            .await
            .unwrap();

        let other = store
            .recent_conversations(&TenantKey::new("u2", "p1"), 10)
            .await
            .unwrap();
        assert!(other.is_empty());
    }
}
