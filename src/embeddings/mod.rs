// src/embeddings/mod.rs
// Embedding service: cache + provider orchestration with lifecycle events

pub mod cache;
pub mod google;
pub mod local;
pub mod openai;
pub mod provider;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, EmbeddingConfig};
use crate::error::{MemoryError, Result};
use crate::events::{
    EventBus, TOPIC_EMBEDDING_BATCH_GENERATED, TOPIC_EMBEDDING_CACHE_HIT, TOPIC_EMBEDDING_ERROR,
    TOPIC_EMBEDDING_GENERATED, TOPIC_EMBEDDING_HEALTH_CHECK,
};

pub use cache::{CacheStats, EmbeddingCache};
pub use provider::EmbeddingProvider;

/// A single embedding result.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
    pub model: String,
    pub provider: String,
    pub dimensions: usize,
    pub cached: bool,
    pub generated_at: DateTime<Utc>,
}

/// A batch embedding result.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingBatchResponse {
    pub embeddings: Vec<EmbeddingResponse>,
    pub total: usize,
    pub cache_hits: usize,
    pub processing_time_ms: u64,
}

/// Provider health report.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthResponse {
    pub provider: String,
    pub status: &'static str,
    pub latency_ms: Option<u64>,
    pub model: String,
}

/// Latency above which a responsive provider is reported as degraded.
const DEGRADED_LATENCY_MS: u64 = 5_000;

/// Service for generating text embeddings with caching and event publishing.
pub struct EmbeddingService {
    provider: EmbeddingProvider,
    cache: EmbeddingCache,
    cache_enabled: bool,
    batch_concurrency: usize,
    event_bus: Arc<EventBus>,
}

impl EmbeddingService {
    pub fn new(
        provider: EmbeddingProvider,
        embedding_config: &EmbeddingConfig,
        cache_config: &CacheConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        info!(
            provider = provider.provider_name(),
            model = provider.model_name(),
            cache_enabled = cache_config.enabled,
            "EmbeddingService initialized"
        );

        Self {
            provider,
            cache: EmbeddingCache::new(cache_config.max_size, cache_config.ttl_hours),
            cache_enabled: cache_config.enabled,
            batch_concurrency: embedding_config.batch_concurrency.max(1),
            event_bus,
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Generate an embedding for a single text. Whitespace-only text is
    /// rejected. Cache hits skip the provider entirely.
    pub async fn embed(&self, text: &str, model: Option<&str>) -> Result<EmbeddingResponse> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MemoryError::InvalidInput("text cannot be empty".into()));
        }

        let model_name = model.unwrap_or(self.provider.model_name()).to_string();

        if self.cache_enabled
            && let Some(embedding) = self.cache.get(text, &model_name)
        {
            debug!("Embedding cache hit ({} chars)", text.len());
            self.event_bus.publish(
                TOPIC_EMBEDDING_CACHE_HIT,
                json!({
                    "text_preview": preview(text),
                    "model": model_name,
                    "provider": self.provider.provider_name(),
                    "dimensions": embedding.len(),
                }),
            );
            return Ok(self.response(embedding, model_name, true));
        }

        let started = Instant::now();
        match self.provider.generate(text).await {
            Ok(embedding) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                if self.cache_enabled {
                    self.cache.set(text, &model_name, embedding.clone());
                }
                self.event_bus.publish(
                    TOPIC_EMBEDDING_GENERATED,
                    json!({
                        "text_preview": preview(text),
                        "model": model_name,
                        "provider": self.provider.provider_name(),
                        "dimensions": embedding.len(),
                        "duration_ms": duration_ms,
                        "cached": false,
                    }),
                );
                debug!(
                    "Embedding generated in {}ms ({} dimensions)",
                    duration_ms,
                    embedding.len()
                );
                Ok(self.response(embedding, model_name, false))
            }
            Err(e) => {
                self.event_bus.publish(
                    TOPIC_EMBEDDING_ERROR,
                    json!({
                        "text_preview": preview(text),
                        "model": model_name,
                        "provider": self.provider.provider_name(),
                        "error": e.to_string(),
                    }),
                );
                warn!("Failed to generate embedding: {}", e);
                Err(e.into())
            }
        }
    }

    /// Generate embeddings for multiple texts. Cache hits are split out;
    /// misses go to the provider in batches of at most `batch_concurrency`
    /// texts per call.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        model: Option<&str>,
    ) -> Result<EmbeddingBatchResponse> {
        let cleaned: Vec<String> = texts
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if cleaned.is_empty() {
            return Err(MemoryError::InvalidInput("no valid texts provided".into()));
        }

        let model_name = model.unwrap_or(self.provider.model_name()).to_string();
        let started = Instant::now();

        let mut responses: Vec<Option<EmbeddingResponse>> = vec![None; cleaned.len()];
        let mut misses: Vec<(usize, String)> = Vec::new();
        let mut cache_hits = 0usize;

        for (idx, text) in cleaned.iter().enumerate() {
            if self.cache_enabled
                && let Some(embedding) = self.cache.get(text, &model_name)
            {
                cache_hits += 1;
                responses[idx] = Some(self.response(embedding, model_name.clone(), true));
            } else {
                misses.push((idx, text.clone()));
            }
        }

        for chunk in misses.chunks(self.batch_concurrency) {
            let chunk_texts: Vec<String> = chunk.iter().map(|(_, t)| t.clone()).collect();
            let embeddings = self
                .provider
                .generate_batch(&chunk_texts)
                .await
                .map_err(MemoryError::Provider)?;

            for ((idx, text), embedding) in chunk.iter().zip(embeddings) {
                if self.cache_enabled {
                    self.cache.set(text, &model_name, embedding.clone());
                }
                responses[*idx] = Some(self.response(embedding, model_name.clone(), false));
            }
        }

        let embeddings: Vec<EmbeddingResponse> = responses.into_iter().flatten().collect();
        let processing_time_ms = started.elapsed().as_millis() as u64;

        self.event_bus.publish(
            TOPIC_EMBEDDING_BATCH_GENERATED,
            json!({
                "total": embeddings.len(),
                "cache_hits": cache_hits,
                "newly_generated": embeddings.len() - cache_hits,
                "processing_time_ms": processing_time_ms,
                "model": model_name,
                "provider": self.provider.provider_name(),
            }),
        );

        info!(
            "Batch embedding complete: {} texts, {} cache hits, {}ms",
            embeddings.len(),
            cache_hits,
            processing_time_ms
        );

        Ok(EmbeddingBatchResponse {
            total: embeddings.len(),
            cache_hits,
            processing_time_ms,
            embeddings,
        })
    }

    /// Probe the provider and classify it as healthy, degraded, or
    /// unavailable.
    pub async fn health(&self) -> ProviderHealthResponse {
        let started = Instant::now();
        let result = self.provider.probe().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (status, latency) = match result {
            Ok(()) if latency_ms < DEGRADED_LATENCY_MS => ("healthy", Some(latency_ms)),
            Ok(()) => ("degraded", Some(latency_ms)),
            Err(_) => ("unavailable", None),
        };

        self.event_bus.publish(
            TOPIC_EMBEDDING_HEALTH_CHECK,
            json!({
                "provider": self.provider.provider_name(),
                "status": status,
                "latency_ms": latency,
            }),
        );

        ProviderHealthResponse {
            provider: self.provider.provider_name().to_string(),
            status,
            latency_ms: latency,
            model: self.provider.model_name().to_string(),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Embedding cache cleared");
    }

    fn response(&self, embedding: Vec<f32>, model: String, cached: bool) -> EmbeddingResponse {
        EmbeddingResponse {
            dimensions: embedding.len(),
            embedding,
            model,
            provider: self.provider.provider_name().to_string(),
            cached,
            generated_at: Utc::now(),
        }
    }
}

/// Event payloads carry at most a short preview, never the full text.
fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}
