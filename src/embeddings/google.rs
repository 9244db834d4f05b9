// src/embeddings/google.rs
// Google embeddings provider (Gemini embedContent API)

use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;

const PROVIDER: &str = "google";

/// Google/Gemini embeddings provider.
/// Default model gemini-embedding-001 (3072 dimensions).
pub struct GoogleEmbeddings {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    dimensions: usize,
    timeout_secs: u64,
}

impl GoogleEmbeddings {
    pub fn new(api_key: String, model: String, dimensions: usize, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            model,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
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

    /// Build the API URL for embedding
    fn api_url(&self) -> String {
        format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    /// Build the batch API URL for embedding multiple texts
    fn batch_api_url(&self) -> String {
        format!(
            "{}/models/{}:batchEmbedContents?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    /// Generate embedding for a single text (one attempt, no retry here)
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        debug!("Generating Gemini embedding for text ({} chars)", text.len());

        let body = json!({
            "model": format!("models/{}", self.model),
            "content": {
                "parts": [{
                    "text": text
                }]
            }
        });

        let response = self
            .client
            .post(self.api_url())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout_secs))?;

        let raw = check_status(response).await?;

        let embedding = parse_values(raw.get("embedding")).ok_or_else(|| {
            ProviderError::BadResponse {
                provider: PROVIDER.into(),
                message: "no embedding values in response".into(),
            }
        })?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    /// Generate embeddings for multiple texts in a single API call
    pub async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<Value> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", self.model),
                    "content": {
                        "parts": [{
                            "text": text
                        }]
                    }
                })
            })
            .collect();

        let response = self
            .client
            .post(self.batch_api_url())
            .header("Content-Type", "application/json")
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout_secs))?;

        let raw = check_status(response).await?;

        let embeddings: Vec<Vec<f32>> = raw
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| ProviderError::BadResponse {
                provider: PROVIDER.into(),
                message: "no embeddings array in batch response".into(),
            })?
            .iter()
            .filter_map(|embedding| parse_values(Some(embedding)))
            .collect();

        if embeddings.len() != texts.len() {
            return Err(ProviderError::BadResponse {
                provider: PROVIDER.into(),
                message: format!(
                    "batch returned {} embeddings for {} texts",
                    embeddings.len(),
                    texts.len()
                ),
            });
        }

        Ok(embeddings)
    }
}

fn parse_values(embedding: Option<&Value>) -> Option<Vec<f32>> {
    let values = embedding?.get("values")?.as_array()?;
    Some(
        values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect(),
    )
}

/// Map transport-level reqwest failures into the provider taxonomy.
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

/// 429 carries Retry-After; any other non-200 is an HTTP provider error.
async fn check_status(response: reqwest::Response) -> Result<Value, ProviderError> {
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

    response
        .json()
        .await
        .map_err(|e| ProviderError::BadResponse {
            provider: PROVIDER.into(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_construction() {
        let provider = GoogleEmbeddings::new(
            "test_key".to_string(),
            "gemini-embedding-001".to_string(),
            3072,
            30,
        );

        let url = provider.api_url();
        assert!(url.contains("gemini-embedding-001"));
        assert!(url.contains("embedContent"));
        assert!(url.contains("key=test_key"));
    }

    #[test]
    fn batch_api_url_construction() {
        let provider = GoogleEmbeddings::new(
            "test_key".to_string(),
            "gemini-embedding-001".to_string(),
            3072,
            30,
        );

        let url = provider.batch_api_url();
        assert!(url.contains("batchEmbedContents"));
        assert!(url.contains("key=test_key"));
    }
}
