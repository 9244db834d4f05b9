// src/config/mod.rs
// Central configuration for the semantix memory service

pub mod helpers;

use serde::{Deserialize, Serialize};

/// Main configuration structure - composes all domain configs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemantixConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub qdrant: QdrantConfig,
    pub embedding: EmbeddingConfig,
    pub cache: CacheConfig,
    pub retrieval: RetrievalConfig,
    pub world_view: WorldViewConfig,
    pub icm: IcmConfig,
    pub llm: LlmConfig,
}

impl SemantixConfig {
    pub fn from_env() -> Self {
        // Don't panic if .env doesn't exist (for production)
        dotenvy::dotenv().ok();

        Self {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            qdrant: QdrantConfig::from_env(),
            embedding: EmbeddingConfig::from_env(),
            cache: CacheConfig::from_env(),
            retrieval: RetrievalConfig::from_env(),
            world_view: WorldViewConfig::from_env(),
            icm: IcmConfig::from_env(),
            llm: LlmConfig::from_env(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: helpers::env_or("SEMANTIX_HOST", "0.0.0.0"),
            port: helpers::env_parsed_or("SEMANTIX_PORT", 8750),
        }
    }
}

/// Primary store (SQLite) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: helpers::env_or("DATABASE_URL", "sqlite://semantix.db?mode=rwc"),
            max_connections: helpers::env_parsed_or("SEMANTIX_DB_MAX_CONNECTIONS", 5),
        }
    }
}

/// Qdrant vector database configuration.
/// When `url` is unset the service boots with the in-memory vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: Option<String>,
}

impl QdrantConfig {
    pub fn from_env() -> Self {
        Self {
            url: helpers::env_opt("QDRANT_URL"),
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// One of: google, openai, local
    pub provider_name: String,
    pub model_name: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub batch_concurrency: usize,
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        Self {
            provider_name: helpers::env_or("SEMANTIX_EMBED_PROVIDER", "google"),
            model_name: helpers::env_or("SEMANTIX_EMBED_MODEL", "gemini-embedding-001"),
            api_key: helpers::env_opt("SEMANTIX_EMBED_API_KEY")
                .or_else(|| helpers::env_opt("GOOGLE_API_KEY"))
                .or_else(|| helpers::env_opt("OPENAI_API_KEY")),
            dimensions: helpers::env_parsed_or("SEMANTIX_EMBED_DIMENSIONS", 3072),
            timeout_seconds: helpers::env_parsed_or("SEMANTIX_EMBED_TIMEOUT_SECONDS", 30),
            max_retries: helpers::env_parsed_or("SEMANTIX_EMBED_MAX_RETRIES", 3),
            retry_delay_seconds: helpers::env_parsed_or("SEMANTIX_EMBED_RETRY_DELAY_SECONDS", 1),
            batch_concurrency: helpers::env_parsed_or("SEMANTIX_EMBED_BATCH_CONCURRENCY", 10),
        }
    }
}

/// Embedding cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_size: usize,
    pub ttl_hours: u64,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: helpers::env_parsed_or("SEMANTIX_CACHE_ENABLED", true),
            max_size: helpers::env_parsed_or("SEMANTIX_CACHE_MAX_SIZE", 1000),
            ttl_hours: helpers::env_parsed_or("SEMANTIX_CACHE_TTL_HOURS", 24),
        }
    }
}

/// Retrieval defaults. The outer query path enforces `default_min_similarity`;
/// internal time-only and world-view fetches apply no similarity floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    pub default_min_similarity: f32,
    pub http_default_limit: usize,
    pub http_max_limit: usize,
}

impl RetrievalConfig {
    pub fn from_env() -> Self {
        Self {
            default_limit: helpers::env_parsed_or("SEMANTIX_RETRIEVAL_DEFAULT_LIMIT", 5),
            default_min_similarity: helpers::env_parsed_or(
                "SEMANTIX_RETRIEVAL_DEFAULT_MIN_SIMILARITY",
                0.7,
            ),
            http_default_limit: helpers::env_parsed_or("SEMANTIX_HTTP_DEFAULT_LIMIT", 10),
            http_max_limit: helpers::env_parsed_or("SEMANTIX_HTTP_MAX_LIMIT", 50),
        }
    }
}

/// World-view builder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldViewConfig {
    pub recent_limit: usize,
}

impl WorldViewConfig {
    pub fn from_env() -> Self {
        Self {
            recent_limit: helpers::env_parsed_or("SEMANTIX_WORLD_VIEW_RECENT_LIMIT", 5),
        }
    }
}

/// How the intent/time classifiers run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IcmMode {
    /// Prompted external model.
    Llm,
    /// Deterministic heuristics, same output schema. An explicit mode, never
    /// a silent fallback.
    Offline,
}

/// Intent/time classifier and identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcmConfig {
    pub mode: IcmMode,
    /// Optional pre-configured identity payload (JSON blob).
    pub identity_json: Option<String>,
}

impl IcmConfig {
    pub fn from_env() -> Self {
        let mode = match helpers::env_or("SEMANTIX_ICM_MODE", "offline").as_str() {
            "llm" => IcmMode::Llm,
            _ => IcmMode::Offline,
        };
        Self {
            mode,
            identity_json: helpers::env_opt("SEMANTIX_IDENTITY_JSON"),
        }
    }
}

/// LLM used for world-view summaries and memory synthesis. Optional: when no
/// API key is configured those paths degrade to deterministic rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: helpers::env_opt("SEMANTIX_LLM_API_KEY")
                .or_else(|| helpers::env_opt("GOOGLE_API_KEY")),
            model: helpers::env_or("SEMANTIX_LLM_MODEL", "gemini-2.0-flash"),
            timeout_seconds: helpers::env_parsed_or("SEMANTIX_LLM_TIMEOUT_SECONDS", 30),
        }
    }
}
