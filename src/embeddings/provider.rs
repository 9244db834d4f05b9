// src/embeddings/provider.rs
// Provider selection and retry policy

use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{info, warn};

use super::google::GoogleEmbeddings;
use super::local::LocalEmbeddings;
use super::openai::OpenAiEmbeddings;
use crate::config::EmbeddingConfig;
use crate::error::ProviderError;

/// Backend-specific embedding implementation
enum ProviderBackend {
    Google(GoogleEmbeddings),
    OpenAi(OpenAiEmbeddings),
    Local(LocalEmbeddings),
}

/// Embedding provider with retry-with-backoff.
///
/// Retryable failures (timeout, connect, HTTP) are retried up to
/// `max_retries` attempts, sleeping `retry_delay * 2^i` between attempts.
/// Rate limits surface immediately with the server's Retry-After.
pub struct EmbeddingProvider {
    backend: ProviderBackend,
    max_retries: u32,
    retry_delay: Duration,
}

impl EmbeddingProvider {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let backend = match config.provider_name.as_str() {
            "google" => {
                let Some(api_key) = config.api_key.clone() else {
                    bail!("google embedding provider requires an API key");
                };
                info!(model = %config.model_name, "Using Google embeddings");
                ProviderBackend::Google(GoogleEmbeddings::new(
                    api_key,
                    config.model_name.clone(),
                    config.dimensions,
                    config.timeout_seconds,
                ))
            }
            "openai" => {
                let Some(api_key) = config.api_key.clone() else {
                    bail!("openai embedding provider requires an API key");
                };
                info!(model = %config.model_name, "Using OpenAI embeddings");
                ProviderBackend::OpenAi(OpenAiEmbeddings::new(
                    api_key,
                    config.model_name.clone(),
                    config.dimensions,
                    config.timeout_seconds,
                ))
            }
            "local" => {
                info!(
                    model = %config.model_name,
                    dimensions = config.dimensions,
                    "Using local embeddings"
                );
                ProviderBackend::Local(LocalEmbeddings::new(
                    config.model_name.clone(),
                    config.dimensions,
                ))
            }
            other => bail!("unknown embedding provider: {other}"),
        };

        Ok(Self {
            backend,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_seconds),
        })
    }

    pub fn provider_name(&self) -> &'static str {
        match &self.backend {
            ProviderBackend::Google(_) => "google",
            ProviderBackend::OpenAi(_) => "openai",
            ProviderBackend::Local(_) => "local",
        }
    }

    pub fn model_name(&self) -> &str {
        match &self.backend {
            ProviderBackend::Google(g) => g.model(),
            ProviderBackend::OpenAi(o) => o.model(),
            ProviderBackend::Local(l) => l.model(),
        }
    }

    pub fn dimensions(&self) -> usize {
        match &self.backend {
            ProviderBackend::Google(g) => g.dimensions(),
            ProviderBackend::OpenAi(o) => o.dimensions(),
            ProviderBackend::Local(l) => l.dimensions(),
        }
    }

    /// Generate one embedding, applying the retry policy.
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.with_retry(|| self.generate_once(text)).await
    }

    /// Generate a batch of embeddings in one provider call, applying the
    /// retry policy to the whole call.
    pub async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.with_retry(|| self.generate_batch_once(texts)).await
    }

    /// Cheap probe used by health checks.
    pub async fn probe(&self) -> Result<(), ProviderError> {
        self.generate_once("health check").await.map(|_| ())
    }

    async fn generate_once(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        match &self.backend {
            ProviderBackend::Google(g) => g.generate(text).await,
            ProviderBackend::OpenAi(o) => o.generate(text).await,
            ProviderBackend::Local(l) => l.generate(text).await,
        }
    }

    async fn generate_batch_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        match &self.backend {
            ProviderBackend::Google(g) => g.generate_batch(texts).await,
            ProviderBackend::OpenAi(o) => o.generate_batch(texts).await,
            ProviderBackend::Local(l) => l.generate_batch(texts).await,
        }
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(e);
                    }
                    let delay = self.retry_delay * 2u32.pow(attempt - 1);
                    warn!(
                        "Embedding attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
