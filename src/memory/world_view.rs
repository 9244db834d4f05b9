// src/memory/world_view.rs
// World view: bounded recent-context payload for a tenant

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::normalize::normalize_turns;
use super::types::TenantKey;
use crate::icm::Compressor;
use crate::llm::LlmClient;
use crate::redaction::strip_memory_blocks;
use crate::storage::sqlite::PrimaryStore;

const SNIPPET_LIMIT: usize = 200;
const SUMMARY_LIMIT: usize = 240;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentConversation {
    pub id: i64,
    pub conversation_id: String,
    pub session_id: Option<String>,
    pub model: String,
    pub created_at: String,
    pub snippet: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldView {
    pub conversation_count: i64,
    pub is_first_conversation: Option<bool>,
    pub recent_conversations: Vec<RecentConversation>,
    pub short_term_memory: Option<String>,
    pub is_cached: bool,
    pub generated_at: String,
}

/// Aggregates the N most recent conversations for a tenant into a compact
/// context payload, optionally summarized. Summarizer input is always
/// memory-block-stripped.
pub struct WorldViewBuilder {
    primary: Arc<PrimaryStore>,
    llm: Option<Arc<LlmClient>>,
    compressor: Compressor,
    recent_limit: usize,
}

impl WorldViewBuilder {
    pub fn new(primary: Arc<PrimaryStore>, llm: Option<Arc<LlmClient>>, recent_limit: usize) -> Self {
        Self {
            primary,
            llm,
            compressor: Compressor::new(),
            recent_limit,
        }
    }

    pub async fn build(
        &self,
        tenant: &TenantKey,
        session_id: Option<&str>,
        summarize: bool,
    ) -> anyhow::Result<WorldView> {
        let conversation_count = match session_id {
            Some(sid) => {
                self.primary
                    .count_conversations_in_session(tenant, sid)
                    .await?
            }
            None => self.primary.count_conversations(tenant).await?,
        };

        let rows = self
            .primary
            .recent_conversations(tenant, self.recent_limit)
            .await?;

        let mut recent = Vec::with_capacity(rows.len());
        // (first user text, last assistant text) per conversation, kept for
        // the summarizer but never exposed in the payload.
        let mut texts: Vec<(String, String)> = Vec::with_capacity(rows.len());

        for row in &rows {
            let turns = normalize_turns(row);
            let first_text = turns
                .first()
                .map(|t| {
                    if t.user.is_empty() {
                        t.assistant.clone()
                    } else {
                        t.user.clone()
                    }
                })
                .unwrap_or_default();
            let last_text = turns
                .last()
                .map(|t| {
                    if t.assistant.is_empty() {
                        t.user.clone()
                    } else {
                        t.assistant.clone()
                    }
                })
                .unwrap_or_default();

            let first_text = strip_memory_blocks(&first_text);
            let last_text = strip_memory_blocks(&last_text);

            recent.push(RecentConversation {
                id: row.id,
                conversation_id: row.conversation_id.clone(),
                session_id: row.session_id.clone(),
                model: row.model.clone(),
                created_at: row.created_at.to_rfc3339(),
                snippet: truncate(&first_text, SNIPPET_LIMIT),
                summary: truncate(
                    &format!(
                        "user: {} ... assistant: {}",
                        truncate(&first_text, 120),
                        truncate(&last_text, 120)
                    ),
                    SUMMARY_LIMIT,
                ),
            });
            texts.push((first_text, last_text));
        }

        let short_term_memory = if summarize && !recent.is_empty() {
            self.summarize(&recent, &texts).await
        } else {
            None
        };

        info!(
            user_id = %tenant.user_id,
            project_id = %tenant.project_id,
            conversation_count,
            recent = recent.len(),
            summarized = short_term_memory.is_some(),
            "World view built"
        );

        Ok(WorldView {
            conversation_count,
            is_first_conversation: session_id.map(|_| conversation_count <= 1),
            recent_conversations: recent,
            short_term_memory,
            is_cached: false,
            generated_at: Utc::now().to_rfc3339(),
        })
    }

    /// LLM summary (under ~120 words) when a client is configured, otherwise
    /// a compressor-produced bullet list of semantic units.
    async fn summarize(
        &self,
        recent: &[RecentConversation],
        texts: &[(String, String)],
    ) -> Option<String> {
        if let Some(llm) = &self.llm {
            let prompt = build_summary_prompt(recent);
            match llm.generate(&prompt).await {
                Ok(summary) => return Some(summary),
                Err(e) => {
                    warn!("World view LLM summary failed: {:#}", e);
                    return None;
                }
            }
        }

        let units: Vec<String> = texts
            .iter()
            .take(10)
            .map(|(user, assistant)| self.compressor.compress(user, assistant).semantic_unit)
            .filter(|u| !u.is_empty())
            .collect();

        if units.is_empty() {
            None
        } else {
            Some(
                units
                    .iter()
                    .map(|u| format!("- {u}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        }
    }
}

fn build_summary_prompt(recent: &[RecentConversation]) -> String {
    let lines: Vec<String> = recent
        .iter()
        .take(3)
        .enumerate()
        .map(|(idx, conv)| {
            let summary = strip_memory_blocks(if conv.summary.is_empty() {
                &conv.snippet
            } else {
                &conv.summary
            });
            format!("{}. ({}) {}", idx + 1, conv.created_at, summary)
        })
        .collect();

    format!(
        "Summarize these recent conversations into a concise short-term memory (under 120 words). \
         Focus on key intents, decisions, and context. Return plain text, no bullets needed.\n{}",
        lines.join("\n")
    )
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
