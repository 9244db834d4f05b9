// src/storage/sqlite/schema.rs
// Embedded schema for the primary store

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS memory_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        project_id TEXT NOT NULL,
        task TEXT NOT NULL DEFAULT '',
        agent TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        raw_data TEXT NOT NULL,
        embedding TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_memory_logs_tenant ON memory_logs(user_id, project_id)",
    r#"
    CREATE TABLE IF NOT EXISTS mental_notes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        project_id TEXT NOT NULL,
        session_id TEXT NOT NULL,
        start_time INTEGER NOT NULL,
        raw_data TEXT NOT NULL,
        embedding TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_mental_notes_tenant ON mental_notes(user_id, project_id)",
    "CREATE INDEX IF NOT EXISTS idx_mental_notes_session ON mental_notes(session_id)",
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        project_id TEXT NOT NULL,
        session_id TEXT,
        model TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        raw_data TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_conversations_tenant ON conversations(user_id, project_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_session ON conversations(session_id)",
    r#"
    CREATE TABLE IF NOT EXISTS icm_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        request_id TEXT NOT NULL,
        icm_type TEXT NOT NULL,
        user_id TEXT,
        project_id TEXT,
        session_id TEXT,
        query TEXT,
        retrieval_strategy TEXT,
        required_memory TEXT,
        confidence REAL,
        payload TEXT NOT NULL,
        time_window_start TEXT,
        time_window_end TEXT,
        results_count INTEGER,
        result_limit INTEGER,
        min_similarity REAL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_icm_logs_request ON icm_logs(request_id)",
    "CREATE INDEX IF NOT EXISTS idx_icm_logs_type ON icm_logs(icm_type, user_id, project_id)",
    r#"
    CREATE TABLE IF NOT EXISTS retrieval_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        request_id TEXT NOT NULL,
        user_id TEXT,
        project_id TEXT,
        session_id TEXT,
        query TEXT,
        required_memory TEXT,
        results TEXT NOT NULL,
        results_count INTEGER NOT NULL,
        result_limit INTEGER,
        min_similarity REAL,
        target TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_retrieval_logs_request ON retrieval_logs(request_id)",
    r#"
    CREATE TABLE IF NOT EXISTS request_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        request_id TEXT NOT NULL,
        path TEXT NOT NULL,
        method TEXT NOT NULL,
        user_id TEXT,
        project_id TEXT,
        session_id TEXT,
        body TEXT,
        created_at TEXT NOT NULL
    )
    "#,
];

/// Create all primary-store tables if missing. Additive-only evolution: new
/// columns arrive via new statements here, never destructive rewrites.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Primary store schema ready");
    Ok(())
}
