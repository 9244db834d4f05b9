// src/memory/pipeline.rs
// Top-level orchestrator: intent -> time -> context -> retrieval -> logs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use super::retrieval::{RetrievalEngine, RetrievalRequest};
use super::session::{SessionState, compute_session_state};
use super::types::{RetrievedMemory, TenantKey};
use super::world_view::{WorldView, WorldViewBuilder};
use crate::error::Result;
use crate::icm::intent::{IntentClassifier, IntentResult, RetrievalStrategy};
use crate::icm::time::{TimeClassifier, TimeResult};
use crate::icm::IdentityProvider;
use crate::redaction::contains_no_memory_sentinel;
use crate::storage::sqlite::{IcmLogEntry, IcmType, PrimaryStore, RetrievalLogEntry};

/// Log target recorded for vector-backed retrieval results. Kept as the
/// historical label consumers of the retrieval_logs table already parse.
const TARGET_VECTOR: &str = "pgvector";
const TARGET_SKIPPED: &str = "skipped";

/// One pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub query: String,
    pub tenant: TenantKey,
    pub session_id: Option<String>,
    pub limit: usize,
    pub min_similarity: f32,
    pub tz_offset_minutes: Option<i32>,
    /// Reference instant; defaults to now. Injectable for determinism.
    pub now: Option<DateTime<Utc>>,
}

/// How the pipeline ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Retrieval skipped entirely: intent said none, or a required item
    /// carried the no-memory sentinel.
    ShortCircuited,
    /// Nothing left to search for after strategy resolution.
    SkippedNoRequired,
    /// Retrieval ran.
    Ran { results: Vec<RetrievedMemory> },
    /// A stage failed but the pipeline completed on its fallback path.
    Degraded {
        reason: String,
        results: Vec<RetrievedMemory>,
    },
}

/// Full pipeline response. Identity and world view are optional: their
/// failures degrade the response, never abort it.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResponse {
    pub request_id: String,
    pub intent: Option<IntentResult>,
    pub time: Option<TimeResult>,
    pub session: Option<SessionState>,
    pub identity: Option<Value>,
    pub world_view: Option<WorldView>,
    pub outcome: PipelineOutcome,
}

impl PipelineResponse {
    pub fn results(&self) -> &[RetrievedMemory] {
        match &self.outcome {
            PipelineOutcome::Ran { results } => results,
            PipelineOutcome::Degraded { results, .. } => results,
            _ => &[],
        }
    }
}

/// Orchestrates one memory query end to end. All stages log to the primary
/// store under a shared request id.
pub struct MemoryPipeline {
    primary: Arc<PrimaryStore>,
    retrieval: Arc<RetrievalEngine>,
    intent_classifier: Arc<IntentClassifier>,
    time_classifier: Arc<TimeClassifier>,
    identity: Arc<IdentityProvider>,
    world_view: Arc<WorldViewBuilder>,
}

impl MemoryPipeline {
    pub fn new(
        primary: Arc<PrimaryStore>,
        retrieval: Arc<RetrievalEngine>,
        intent_classifier: Arc<IntentClassifier>,
        time_classifier: Arc<TimeClassifier>,
        identity: Arc<IdentityProvider>,
        world_view: Arc<WorldViewBuilder>,
    ) -> Self {
        Self {
            primary,
            retrieval,
            intent_classifier,
            time_classifier,
            identity,
            world_view,
        }
    }

    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineResponse> {
        let request_id = Uuid::new_v4().to_string();
        let now = request.now.unwrap_or_else(Utc::now);
        let tenant = &request.tenant;

        // Intent classification. Failure falls back to world-view context
        // with no required memory; the pipeline continues degraded.
        let (intent_result, classifier_failure) =
            match self.intent_classifier.classify(&request.query).await {
                Ok(result) => (Some(result), None),
                Err(e) => {
                    warn!("Intent classification failed: {}", e);
                    (None, Some(e.to_string()))
                }
            };

        // Time classification always runs, even when unused downstream.
        let time_result = match self
            .time_classifier
            .resolve(&request.query, now, request.tz_offset_minutes)
            .await
        {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Time classification failed: {}", e);
                None
            }
        };

        let session_state =
            compute_session_state(&self.primary, tenant, request.session_id.as_deref()).await;

        let (window_start, window_end) = time_result
            .as_ref()
            .map(|t| t.window())
            .unwrap_or((None, None));

        let resolution = resolve_retrieval(intent_result.as_ref(), &request.query);

        // Identity and world view fetch concurrently; both degrade to None.
        let summarize =
            !resolution.sentinel_hit && resolution.strategy != RetrievalStrategy::None;
        let (identity_payload, world_view_payload) = tokio::join!(
            async {
                Some(
                    self.identity
                        .get_identity(Some(&tenant.user_id), Some(&tenant.project_id)),
                )
            },
            async {
                match self
                    .world_view
                    .build(tenant, request.session_id.as_deref(), summarize)
                    .await
                {
                    Ok(view) => Some(view),
                    Err(e) => {
                        warn!("World view failed: {:#}", e);
                        None
                    }
                }
            }
        );

        info!(
            request_id = %request_id,
            query = %request.query,
            strategy = resolution.strategy.as_str(),
            required = resolution.required_memory.len(),
            sentinel = resolution.sentinel_hit,
            "Pipeline resolution"
        );

        if let Some(view) = &world_view_payload {
            self.log_icm(
                &request_id,
                IcmType::WorldView,
                &request,
                &resolution,
                None,
                serde_json::to_value(view).unwrap_or(Value::Null),
                (None, None),
                None,
            )
            .await;
        }

        if let Some(identity) = &identity_payload {
            self.log_icm(
                &request_id,
                IcmType::Identity,
                &request,
                &resolution,
                None,
                identity.clone(),
                (None, None),
                None,
            )
            .await;
        }

        // Short-circuit: the intent said no retrieval, or a required item
        // carries the no-memory sentinel.
        if resolution.short_circuit {
            self.log_retrieval_payload(&request_id, &request, &resolution, &[], TARGET_SKIPPED)
                .await;
            return Ok(PipelineResponse {
                request_id,
                intent: intent_result,
                time: time_result,
                session: session_state,
                identity: identity_payload,
                world_view: world_view_payload,
                outcome: PipelineOutcome::ShortCircuited,
            });
        }

        if let Some(state) = &session_state {
            self.log_icm(
                &request_id,
                IcmType::Session,
                &request,
                &resolution,
                None,
                serde_json::to_value(state).unwrap_or(Value::Null),
                (None, None),
                None,
            )
            .await;
        }

        if let Some(intent) = &intent_result {
            self.log_icm(
                &request_id,
                IcmType::Intent,
                &request,
                &resolution,
                Some(intent.confidence),
                json!({ "intent": intent, "session_state": session_state }),
                (None, None),
                None,
            )
            .await;
        }

        if let Some(time) = &time_result {
            self.log_icm(
                &request_id,
                IcmType::Time,
                &request,
                &resolution,
                Some(time.resolution_confidence),
                serde_json::to_value(time).unwrap_or(Value::Null),
                (window_start, window_end),
                None,
            )
            .await;
        }

        if resolution.required_memory.is_empty() {
            self.log_retrieval_payload(&request_id, &request, &resolution, &[], TARGET_SKIPPED)
                .await;
            return Ok(PipelineResponse {
                request_id,
                intent: intent_result,
                time: time_result,
                session: session_state,
                identity: identity_payload,
                world_view: world_view_payload,
                outcome: PipelineOutcome::SkippedNoRequired,
            });
        }

        let retrieval_request = RetrievalRequest {
            required_memory: resolution.required_memory.clone(),
            strategy: resolution.strategy,
            tenant: tenant.clone(),
            limit: request.limit,
            min_similarity: request.min_similarity,
            start: window_start,
            end: window_end,
            time_text: Some(request.query.clone()),
            now,
            tz_offset_minutes: request.tz_offset_minutes,
        };

        let results = self
            .retrieval
            .fetch_required_memory(&retrieval_request)
            .await?;

        info!(
            request_id = %request_id,
            results = results.len(),
            min_similarity = request.min_similarity,
            "Retrieval completed"
        );

        self.log_icm(
            &request_id,
            IcmType::Retrieval,
            &request,
            &resolution,
            None,
            json!({ "intent": intent_result, "time": time_result }),
            (window_start, window_end),
            Some(results.len() as i64),
        )
        .await;

        self.log_retrieval_payload(&request_id, &request, &resolution, &results, TARGET_VECTOR)
            .await;

        let outcome = match classifier_failure {
            Some(reason) => PipelineOutcome::Degraded { reason, results },
            None => PipelineOutcome::Ran { results },
        };

        Ok(PipelineResponse {
            request_id,
            intent: intent_result,
            time: time_result,
            session: session_state,
            identity: identity_payload,
            world_view: world_view_payload,
            outcome,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn log_icm(
        &self,
        request_id: &str,
        icm_type: IcmType,
        request: &PipelineRequest,
        resolution: &RetrievalResolution,
        confidence: Option<f32>,
        payload: Value,
        window: (Option<DateTime<Utc>>, Option<DateTime<Utc>>),
        results_count: Option<i64>,
    ) {
        let entry = IcmLogEntry {
            request_id: request_id.to_string(),
            icm_type,
            user_id: Some(request.tenant.user_id.clone()),
            project_id: Some(request.tenant.project_id.clone()),
            session_id: request.session_id.clone(),
            query: request.query.clone(),
            retrieval_strategy: Some(resolution.strategy.as_str().to_string()),
            required_memory: resolution.required_memory.clone(),
            confidence,
            payload,
            time_window_start: window.0,
            time_window_end: window.1,
            results_count,
            limit: Some(request.limit as i64),
            min_similarity: Some(request.min_similarity),
        };

        if let Err(e) = self.primary.logs().insert_icm_log(&entry).await {
            warn!("Failed to persist {} ICM log: {}", icm_type.as_str(), e);
        }
    }

    async fn log_retrieval_payload(
        &self,
        request_id: &str,
        request: &PipelineRequest,
        resolution: &RetrievalResolution,
        results: &[RetrievedMemory],
        target: &str,
    ) {
        let entry = RetrievalLogEntry {
            request_id: request_id.to_string(),
            user_id: Some(request.tenant.user_id.clone()),
            project_id: Some(request.tenant.project_id.clone()),
            session_id: request.session_id.clone(),
            query: request.query.clone(),
            required_memory: resolution.required_memory.clone(),
            results: serde_json::to_value(results).unwrap_or(Value::Null),
            results_count: results.len() as i64,
            limit: Some(request.limit as i64),
            min_similarity: Some(request.min_similarity),
            target: target.to_string(),
        };

        if let Err(e) = self.primary.logs().insert_retrieval_log(&entry).await {
            warn!("Failed to persist retrieval log: {}", e);
        }
    }
}

/// Effective strategy and required memory for one run.
#[derive(Debug, Clone)]
struct RetrievalResolution {
    strategy: RetrievalStrategy,
    required_memory: Vec<String>,
    sentinel_hit: bool,
    /// True when retrieval must not run at all: the intent asked for none,
    /// or the sentinel fired.
    short_circuit: bool,
}

/// Derive the effective retrieval plan from the intent result:
/// a `none` strategy upgrades to `world_view` for context, an empty
/// required-memory list is seeded with the raw query, and any required item
/// carrying the no-memory sentinel flags the run for short-circuit.
fn resolve_retrieval(intent: Option<&IntentResult>, query: &str) -> RetrievalResolution {
    let intent_strategy = intent
        .map(|i| i.retrieval_strategy)
        .unwrap_or(RetrievalStrategy::WorldView);

    let mut required_memory: Vec<String> = intent
        .map(|i| i.required_memory.clone())
        .unwrap_or_default();

    let strategy = if intent_strategy == RetrievalStrategy::None {
        RetrievalStrategy::WorldView
    } else {
        intent_strategy
    };

    if required_memory.is_empty() {
        required_memory = vec![query.to_string()];
    }

    let sentinel_hit = required_memory
        .iter()
        .any(|item| contains_no_memory_sentinel(item));

    RetrievalResolution {
        strategy,
        required_memory,
        sentinel_hit,
        short_circuit: intent_strategy == RetrievalStrategy::None || sentinel_hit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icm::intent::FallbackIntent;

    fn intent(strategy: RetrievalStrategy, required: Vec<&str>) -> IntentResult {
        IntentResult {
            intent: "test".into(),
            confidence: 0.9,
            route: "retrieve".into(),
            required_memory: required.into_iter().map(String::from).collect(),
            retrieval_strategy: strategy,
            entities: vec![],
            fallback: FallbackIntent::default(),
            notes: String::new(),
        }
    }

    #[test]
    fn none_strategy_upgrades_but_short_circuits() {
        let result = resolve_retrieval(
            Some(&intent(RetrievalStrategy::None, vec![])),
            "hello",
        );
        assert_eq!(result.strategy, RetrievalStrategy::WorldView);
        assert!(result.short_circuit);
        assert_eq!(result.required_memory, vec!["hello"]);
    }

    #[test]
    fn empty_required_memory_seeds_query() {
        let result = resolve_retrieval(
            Some(&intent(RetrievalStrategy::Conversations, vec![])),
            "auth bug",
        );
        assert!(!result.short_circuit);
        assert_eq!(result.required_memory, vec!["auth bug"]);
    }

    #[test]
    fn sentinel_forces_short_circuit() {
        let result = resolve_retrieval(
            Some(&intent(
                RetrievalStrategy::Conversations,
                vec!["[semantix-memory-block] No relevant memories found"],
            )),
            "q",
        );
        assert!(result.sentinel_hit);
        assert!(result.short_circuit);
    }

    #[test]
    fn classifier_failure_falls_back_to_world_view() {
        let result = resolve_retrieval(None, "what's up");
        assert_eq!(result.strategy, RetrievalStrategy::WorldView);
        assert!(!result.short_circuit);
        assert_eq!(result.required_memory, vec!["what's up"]);
    }
}
