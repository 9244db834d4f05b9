// src/embeddings/openai.rs
// OpenAI embeddings provider (text-embedding-3 family)

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;

const PROVIDER: &str = "openai";

/// OpenAI embeddings provider.
pub struct OpenAiEmbeddings {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    dimensions: usize,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: String, model: String, dimensions: usize, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            dimensions,
            timeout_secs,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn api_url(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    pub async fn generate(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let input = [text.to_string()];
        let mut embeddings = self.request(&input).await?;
        embeddings.pop().ok_or_else(|| ProviderError::BadResponse {
            provider: PROVIDER.into(),
            message: "empty data array".into(),
        })
    }

    pub async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        debug!("Generating OpenAI embeddings for {} texts", input.len());

        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                input,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout_secs))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimit {
                provider: PROVIDER.into(),
                retry_after_secs,
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: PROVIDER.into(),
                status: status.as_u16(),
                message,
            });
        }

        let mut parsed: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::BadResponse {
                    provider: PROVIDER.into(),
                    message: e.to_string(),
                })?;

        if parsed.data.len() != input.len() {
            return Err(ProviderError::BadResponse {
                provider: PROVIDER.into(),
                message: format!(
                    "got {} embeddings for {} inputs",
                    parsed.data.len(),
                    input.len()
                ),
            });
        }

        // The API documents data[] ordering by index; sort to be safe.
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

fn classify_transport(e: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout {
            provider: PROVIDER.into(),
            timeout_secs,
        }
    } else if e.is_connect() {
        ProviderError::Connect {
            provider: PROVIDER.into(),
            message: e.to_string(),
        }
    } else {
        ProviderError::BadResponse {
            provider: PROVIDER.into(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_construction() {
        let provider = OpenAiEmbeddings::new(
            "sk-test".to_string(),
            "text-embedding-3-large".to_string(),
            3072,
            30,
        );
        assert_eq!(provider.api_url(), "https://api.openai.com/v1/embeddings");
    }
}
