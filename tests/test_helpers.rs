// tests/test_helpers.rs
// Shared fixture: full stack on in-memory stores and the local embedder

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use semantix::config::{
    CacheConfig, DatabaseConfig, EmbeddingConfig, IcmConfig, IcmMode, LlmConfig, QdrantConfig,
    RetrievalConfig, SemantixConfig, ServerConfig, WorldViewConfig,
};
use semantix::state::AppState;
use semantix::storage::VectorIndex;

pub fn test_config() -> SemantixConfig {
    SemantixConfig {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseConfig {
            // In-memory SQLite is per-connection; a single pooled connection
            // keeps every component on the same database.
            database_url: "sqlite::memory:".into(),
            max_connections: 1,
        },
        qdrant: QdrantConfig { url: None },
        embedding: EmbeddingConfig {
            provider_name: "local".into(),
            model_name: "local-hash".into(),
            api_key: None,
            dimensions: 256,
            timeout_seconds: 5,
            max_retries: 2,
            retry_delay_seconds: 1,
            batch_concurrency: 4,
        },
        cache: CacheConfig {
            enabled: true,
            max_size: 100,
            ttl_hours: 1,
        },
        retrieval: RetrievalConfig {
            default_limit: 5,
            default_min_similarity: 0.7,
            http_default_limit: 10,
            http_max_limit: 50,
        },
        world_view: WorldViewConfig { recent_limit: 5 },
        icm: IcmConfig {
            mode: IcmMode::Offline,
            identity_json: None,
        },
        llm: LlmConfig {
            api_key: None,
            model: "gemini-2.0-flash".into(),
            timeout_seconds: 5,
        },
    }
}

pub async fn test_app() -> Arc<AppState> {
    AppState::initialize(test_config()).await.unwrap()
}

/// Wait until a vector collection reaches the expected count. Ingestion is
/// event-driven and asynchronous.
pub async fn wait_for_vectors(
    vectors: &Arc<dyn VectorIndex>,
    collection: &str,
    expected: u64,
) -> bool {
    for _ in 0..100 {
        if vectors.count(collection).await.unwrap_or(0) >= expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
