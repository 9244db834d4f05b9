// src/llm/mod.rs
// Gemini generateContent client for summaries, synthesis, and LLM-mode ICM

use std::time::Duration;

use anyhow::{Result, anyhow};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::LlmConfig;

/// Minimal Gemini text-generation client. Optional everywhere it is used:
/// when no API key is configured, callers degrade to deterministic paths.
pub struct LlmClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl LlmClient {
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_else(|_| Client::new());

        Some(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        })
    }

    fn api_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    /// Generate plain text for a prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("LLM generate ({} chars prompt)", prompt.len());

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        });

        let response = self
            .client
            .post(self.api_url())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API error {}: {}", status, error_text));
        }

        let raw: Value = response.json().await?;
        let text = raw
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("no text in LLM response"))?;

        Ok(text)
    }

    /// Generate a response expected to be a single JSON object. Markdown
    /// code fences around the object are tolerated.
    pub async fn generate_json(&self, prompt: &str) -> Result<Value> {
        let text = self.generate(prompt).await?;
        let cleaned = strip_code_fences(&text);
        serde_json::from_str(cleaned)
            .map_err(|e| anyhow!("LLM returned malformed JSON: {e}: {cleaned}"))
    }
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[]\n```"), "[]");
    }

    #[test]
    fn no_client_without_api_key() {
        let config = LlmConfig {
            api_key: None,
            model: "gemini-2.0-flash".into(),
            timeout_seconds: 30,
        };
        assert!(LlmClient::from_config(&config).is_none());
    }
}
