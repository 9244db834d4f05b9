// src/storage/sqlite/logs.rs
// ICM, retrieval, and request log operations

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

/// Which pipeline stage an ICM log row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmType {
    Session,
    Intent,
    Time,
    WorldView,
    Identity,
    Retrieval,
}

impl IcmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IcmType::Session => "session",
            IcmType::Intent => "intent",
            IcmType::Time => "time",
            IcmType::WorldView => "world_view",
            IcmType::Identity => "identity",
            IcmType::Retrieval => "retrieval",
        }
    }
}

/// One ICM log row. Classifications are never mutated after persistence.
#[derive(Debug, Clone)]
pub struct IcmLogEntry {
    pub request_id: String,
    pub icm_type: IcmType,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub session_id: Option<String>,
    pub query: String,
    pub retrieval_strategy: Option<String>,
    pub required_memory: Vec<String>,
    pub confidence: Option<f32>,
    pub payload: Value,
    pub time_window_start: Option<DateTime<Utc>>,
    pub time_window_end: Option<DateTime<Utc>>,
    pub results_count: Option<i64>,
    pub limit: Option<i64>,
    pub min_similarity: Option<f32>,
}

/// One retrieval payload row, with the full result list embedded.
#[derive(Debug, Clone)]
pub struct RetrievalLogEntry {
    pub request_id: String,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub session_id: Option<String>,
    pub query: String,
    pub required_memory: Vec<String>,
    pub results: Value,
    pub results_count: i64,
    pub limit: Option<i64>,
    pub min_similarity: Option<f32>,
    pub target: String,
}

pub struct LogOperations {
    pool: SqlitePool,
}

impl LogOperations {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_icm_log(&self, entry: &IcmLogEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO icm_logs (
                request_id, icm_type, user_id, project_id, session_id, query,
                retrieval_strategy, required_memory, confidence, payload,
                time_window_start, time_window_end, results_count, result_limit,
                min_similarity, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.request_id)
        .bind(entry.icm_type.as_str())
        .bind(&entry.user_id)
        .bind(&entry.project_id)
        .bind(&entry.session_id)
        .bind(&entry.query)
        .bind(&entry.retrieval_strategy)
        .bind(serde_json::to_string(&entry.required_memory)?)
        .bind(entry.confidence)
        .bind(entry.payload.to_string())
        .bind(entry.time_window_start)
        .bind(entry.time_window_end)
        .bind(entry.results_count)
        .bind(entry.limit)
        .bind(entry.min_similarity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn insert_retrieval_log(&self, entry: &RetrievalLogEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO retrieval_logs (
                request_id, user_id, project_id, session_id, query,
                required_memory, results, results_count, result_limit,
                min_similarity, target, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.request_id)
        .bind(&entry.user_id)
        .bind(&entry.project_id)
        .bind(&entry.session_id)
        .bind(&entry.query)
        .bind(serde_json::to_string(&entry.required_memory)?)
        .bind(entry.results.to_string())
        .bind(entry.results_count)
        .bind(entry.limit)
        .bind(entry.min_similarity)
        .bind(&entry.target)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn insert_request_log(
        &self,
        request_id: &str,
        path: &str,
        method: &str,
        user_id: Option<&str>,
        project_id: Option<&str>,
        session_id: Option<&str>,
        body: &Value,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO request_logs
                (request_id, path, method, user_id, project_id, session_id, body, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request_id)
        .bind(path)
        .bind(method)
        .bind(user_id)
        .bind(project_id)
        .bind(session_id)
        .bind(body.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// ICM stage names logged for a request, in insertion order. Used by
    /// diagnostics and tests.
    pub async fn icm_types_for_request(&self, request_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT icm_type FROM icm_logs WHERE request_id = ? ORDER BY id")
            .bind(request_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("icm_type")).collect())
    }

    /// Retrieval log targets for a request, in insertion order.
    pub async fn retrieval_targets_for_request(&self, request_id: &str) -> Result<Vec<String>> {
        let rows =
            sqlx::query("SELECT target FROM retrieval_logs WHERE request_id = ? ORDER BY id")
                .bind(request_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.get("target")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_logs() -> LogOperations {
        let pool = SqlitePoolOptions::new()
            .connect(":memory:")
            .await
            .unwrap();
        crate::storage::sqlite::schema::run_migrations(&pool)
            .await
            .unwrap();
        LogOperations::new(pool)
    }

    #[tokio::test]
    async fn icm_log_round_trip() {
        let logs = test_logs().await;
        let entry = IcmLogEntry {
            request_id: "req-1".into(),
            icm_type: IcmType::Intent,
            user_id: Some("u".into()),
            project_id: Some("p".into()),
            session_id: None,
            query: "what happened yesterday".into(),
            retrieval_strategy: Some("conversations".into()),
            required_memory: vec!["auth bug".into()],
            confidence: Some(0.82),
            payload: serde_json::json!({ "intent": "episodic_lookup" }),
            time_window_start: None,
            time_window_end: None,
            results_count: None,
            limit: Some(5),
            min_similarity: Some(0.7),
        };
        logs.insert_icm_log(&entry).await.unwrap();

        let types = logs.icm_types_for_request("req-1").await.unwrap();
        assert_eq!(types, vec!["intent"]);
    }

    #[tokio::test]
    async fn retrieval_log_records_target() {
        let logs = test_logs().await;
        let entry = RetrievalLogEntry {
            request_id: "req-2".into(),
            user_id: Some("u".into()),
            project_id: Some("p".into()),
            session_id: None,
            query: "q".into(),
            required_memory: vec![],
            results: serde_json::json!([]),
            results_count: 0,
            limit: None,
            min_similarity: None,
            target: "skipped".into(),
        };
        logs.insert_retrieval_log(&entry).await.unwrap();

        let targets = logs.retrieval_targets_for_request("req-2").await.unwrap();
        assert_eq!(targets, vec!["skipped"]);
    }
}
