// src/memory/retrieval.rs
// Retrieval engine: strategy dispatch, time gating, per-item fan-out

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, info};

use super::normalize::normalize_turns;
use super::types::{ConversationRow, RetrievedMemory, TenantKey};
use crate::embeddings::EmbeddingService;
use crate::error::Result;
use crate::icm::intent::RetrievalStrategy;
use crate::icm::time::TimeClassifier;
use crate::storage::collections::{SourceKind, collection_name};
use crate::storage::sqlite::PrimaryStore;
use crate::storage::{SearchHit, VectorIndex};

/// Inputs for one retrieval run.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub required_memory: Vec<String>,
    pub strategy: RetrievalStrategy,
    pub tenant: TenantKey,
    pub limit: usize,
    pub min_similarity: f32,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Text for late time resolution when no window was supplied.
    pub time_text: Option<String>,
    pub now: DateTime<Utc>,
    pub tz_offset_minutes: Option<i32>,
}

/// Executes the chosen retrieval strategy against the vector store, with an
/// optional hard time gate checked against the primary store first.
pub struct RetrievalEngine {
    primary: Arc<PrimaryStore>,
    vectors: Arc<dyn VectorIndex>,
    embeddings: Arc<EmbeddingService>,
    time_classifier: Arc<TimeClassifier>,
    default_limit: usize,
    world_view_recent_limit: usize,
    fanout_concurrency: usize,
}

impl RetrievalEngine {
    pub fn new(
        primary: Arc<PrimaryStore>,
        vectors: Arc<dyn VectorIndex>,
        embeddings: Arc<EmbeddingService>,
        time_classifier: Arc<TimeClassifier>,
        default_limit: usize,
        world_view_recent_limit: usize,
        fanout_concurrency: usize,
    ) -> Self {
        Self {
            primary,
            vectors,
            embeddings,
            time_classifier,
            default_limit: default_limit.max(1),
            world_view_recent_limit: world_view_recent_limit.max(1),
            fanout_concurrency: fanout_concurrency.max(1),
        }
    }

    fn effective_limit(&self, request: &RetrievalRequest) -> usize {
        if request.limit == 0 {
            self.default_limit
        } else {
            request.limit
        }
    }

    pub async fn fetch_required_memory(
        &self,
        request: &RetrievalRequest,
    ) -> Result<Vec<RetrievedMemory>> {
        if request.required_memory.is_empty() || request.strategy == RetrievalStrategy::None {
            return Ok(Vec::new());
        }

        // World-view strategy: most recent conversations, no embedding calls.
        if request.strategy == RetrievalStrategy::WorldView {
            return self.fetch_world_view_recent(request).await;
        }

        let limit = self.effective_limit(request);
        let (start, end) = self.resolve_window(request).await;

        // Hard gate: with a window set, a time-only fetch that comes back
        // empty ends retrieval before any embedding is charged.
        if let (Some(start), Some(end)) = (start, end) {
            let in_window = self
                .primary
                .conversations_in_range(&request.tenant, start, end, limit)
                .await?;
            info!(
                start = %start,
                end = %end,
                matches = in_window.len(),
                "Resolved retrieval window"
            );
            if in_window.is_empty() {
                return Ok(Vec::new());
            }
        }

        let collection = collection_name(&request.tenant, SourceKind::Conversation);

        // Bounded fan-out over required-memory items.
        let searches = futures::stream::iter(request.required_memory.iter().cloned())
            .map(|item| {
                let collection = collection.clone();
                async move {
                    let hits = self
                        .search_item(&collection, &item, start, end, limit, request)
                        .await?;
                    Ok::<_, crate::error::MemoryError>((item, hits))
                }
            })
            .buffered(self.fanout_concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut results: Vec<RetrievedMemory> = Vec::new();
        for search in searches {
            let (item, hits) = search?;
            debug!(item = %item, hits = hits.len(), "Required-memory search complete");
            for hit in hits {
                if let Some(memory) = hit_to_memory(&hit, &request.tenant, &item) {
                    results.push(memory);
                }
            }
        }

        sort_results(&mut results);
        Ok(results)
    }

    async fn search_item(
        &self,
        collection: &str,
        item: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
        request: &RetrievalRequest,
    ) -> Result<Vec<SearchHit>> {
        let embedding = self.embeddings.embed(item, None).await?.embedding;

        let hits = match (start, end) {
            (Some(start), Some(end)) => {
                self.vectors
                    .query_by_time(collection, &embedding, limit, start, end, &vec![])
                    .await?
            }
            _ => {
                self.vectors
                    .query(collection, &embedding, limit, &vec![])
                    .await?
            }
        };

        Ok(hits
            .into_iter()
            .filter(|h| h.similarity >= request.min_similarity)
            .collect())
    }

    async fn fetch_world_view_recent(
        &self,
        request: &RetrievalRequest,
    ) -> Result<Vec<RetrievedMemory>> {
        // Bounded both by the caller's limit and the recent-context cap.
        let limit = self
            .effective_limit(request)
            .min(self.world_view_recent_limit);
        let rows = self.primary.recent_conversations(&request.tenant, limit).await?;

        Ok(rows
            .iter()
            .map(|row| RetrievedMemory {
                source: "world_view".to_string(),
                similarity: 1.0,
                conversation_id: row.conversation_id.clone(),
                created_at: Some(row.created_at),
                model: Some(row.model.clone()),
                user_id: row.user_id.clone(),
                project_id: row.project_id.clone(),
                turns: normalize_turns(row),
                topic: topic_of(&row.raw_data),
                required_item: "world_view".to_string(),
            })
            .collect())
    }

    /// Late time resolution: when the caller supplied no window but gave
    /// time text, ask the time classifier.
    async fn resolve_window(
        &self,
        request: &RetrievalRequest,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        if request.start.is_some() || request.end.is_some() {
            return (request.start, request.end);
        }

        let Some(time_text) = &request.time_text else {
            return (None, None);
        };

        match self
            .time_classifier
            .resolve(time_text, request.now, request.tz_offset_minutes)
            .await
        {
            Ok(result) => result.window(),
            Err(e) => {
                debug!("Late time resolution failed: {}", e);
                (None, None)
            }
        }
    }
}

/// Normalize one vector hit into the caller-facing shape.
fn hit_to_memory(hit: &SearchHit, tenant: &TenantKey, required_item: &str) -> Option<RetrievedMemory> {
    let document = hit.document.as_object()?;

    let conversation_id = document
        .get("conversation_id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let created_at = document
        .get("created_at")
        .and_then(|v| v.as_str())
        .or_else(|| hit.metadata.get("created_at").and_then(|v| v.as_str()))
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));

    let raw_data = document
        .get("raw_data")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    let row = ConversationRow {
        id: hit.id,
        conversation_id: conversation_id.clone(),
        user_id: tenant.user_id.clone(),
        project_id: tenant.project_id.clone(),
        session_id: document
            .get("session_id")
            .and_then(|v| v.as_str())
            .map(String::from),
        model: document
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        created_at: created_at.unwrap_or_else(Utc::now),
        raw_data: raw_data.clone(),
    };

    Some(RetrievedMemory {
        source: "conversations".to_string(),
        similarity: hit.similarity,
        conversation_id,
        created_at,
        model: Some(row.model.clone()),
        user_id: tenant.user_id.clone(),
        project_id: tenant.project_id.clone(),
        turns: normalize_turns(&row),
        topic: topic_of(&raw_data),
        required_item: required_item.to_string(),
    })
}

fn topic_of(raw_data: &serde_json::Value) -> Option<String> {
    raw_data
        .get("topic")
        .and_then(|v| v.as_str())
        .map(String::from)
}

/// Similarity descending; equal similarity prefers newer conversations,
/// remaining ties break on conversation id.
fn sort_results(results: &mut [RetrievedMemory]) {
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.conversation_id.cmp(&b.conversation_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn memory(similarity: f32, created_at: DateTime<Utc>, id: &str) -> RetrievedMemory {
        RetrievedMemory {
            source: "conversations".into(),
            similarity,
            conversation_id: id.into(),
            created_at: Some(created_at),
            model: None,
            user_id: "u".into(),
            project_id: "p".into(),
            turns: vec![],
            topic: None,
            required_item: "q".into(),
        }
    }

    #[test]
    fn sorting_breaks_ties_by_recency_then_id() {
        let now = Utc::now();
        let mut results = vec![
            memory(0.8, now - Duration::days(2), "b"),
            memory(0.9, now, "c"),
            memory(0.8, now, "a"),
            memory(0.8, now, "b"),
        ];
        sort_results(&mut results);

        assert_eq!(results[0].conversation_id, "c");
        // Same similarity: newer first, then id "a" before "b".
        assert_eq!(results[1].conversation_id, "a");
        assert_eq!(results[2].conversation_id, "b");
        assert_eq!(results[3].conversation_id, "b");
        assert_eq!(results[3].created_at, Some(now - Duration::days(2)));
    }
}
