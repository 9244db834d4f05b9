// src/api/http/memory.rs
// POST /fetch-memory: pipeline run + memory synthesis

use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{FetchMemoryRequest, FetchMemoryResponse};
use crate::memory::types::{RetrievedMemory, TenantKey};
use crate::memory::{PipelineRequest, WorldView};
use crate::state::AppState;

/// Returned whenever retrieval produces nothing usable.
pub const NO_MEMORIES: &str = "No relevant memories found.";

/// POST /fetch-memory
pub async fn fetch_memory(
    State(app): State<Arc<AppState>>,
    Json(request): Json<FetchMemoryRequest>,
) -> ApiResult<impl IntoResponse> {
    validate(&request, app.config.retrieval.http_max_limit)?;

    let request_id = Uuid::new_v4().to_string();
    log_request(&app, &request_id, &request).await;

    let pipeline_request = PipelineRequest {
        query: request.query.clone(),
        tenant: TenantKey::new(request.user_id.clone(), request.project_id.clone()),
        session_id: request.session_id.clone(),
        limit: request
            .limit
            .unwrap_or(app.config.retrieval.http_default_limit),
        min_similarity: request
            .min_similarity
            .unwrap_or(app.config.retrieval.default_min_similarity),
        tz_offset_minutes: None,
        now: None,
    };

    let response = app.pipeline.run(pipeline_request).await.map_err(ApiError::from)?;
    let results = response.results();

    if results.is_empty() {
        info!(request_id = %response.request_id, "No memories qualified");
        return Ok(Json(FetchMemoryResponse {
            memory: NO_MEMORIES.to_string(),
        }));
    }

    let memory = synthesize(
        &app,
        &request.query,
        results,
        response.world_view.as_ref(),
        response.identity.as_ref(),
    )
    .await;

    Ok(Json(FetchMemoryResponse { memory }))
}

fn validate(request: &FetchMemoryRequest, max_limit: usize) -> Result<(), ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must be non-empty"));
    }
    if request.user_id.trim().is_empty() || request.project_id.trim().is_empty() {
        return Err(ApiError::bad_request("user_id and project_id are required"));
    }
    if let Some(limit) = request.limit
        && (limit == 0 || limit > max_limit)
    {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {max_limit}"
        )));
    }
    if let Some(sim) = request.min_similarity
        && !(0.0..=1.0).contains(&sim)
    {
        return Err(ApiError::bad_request("min_similarity must be in [0, 1]"));
    }
    Ok(())
}

async fn log_request(app: &AppState, request_id: &str, request: &FetchMemoryRequest) {
    let body = serde_json::to_value(request).unwrap_or(Value::Null);
    if let Err(e) = app
        .primary
        .logs()
        .insert_request_log(
            request_id,
            "/fetch-memory",
            "POST",
            Some(&request.user_id),
            Some(&request.project_id),
            request.session_id.as_deref(),
            &body,
        )
        .await
    {
        warn!("Failed to write request log: {}", e);
    }
}

/// Synthesize the final memory string: LLM when configured, deterministic
/// rendering otherwise.
async fn synthesize(
    app: &AppState,
    query: &str,
    results: &[RetrievedMemory],
    world_view: Option<&WorldView>,
    identity: Option<&Value>,
) -> String {
    if let Some(llm) = &app.llm {
        let prompt = build_synthesis_prompt(query, results, world_view, identity);
        match llm.generate(&prompt).await {
            Ok(text) => return text,
            Err(e) => warn!("Memory synthesis failed, rendering directly: {:#}", e),
        }
    }
    render_results(results)
}

fn build_synthesis_prompt(
    query: &str,
    results: &[RetrievedMemory],
    world_view: Option<&WorldView>,
    identity: Option<&Value>,
) -> String {
    let mut sections = Vec::new();

    sections.push(format!(
        "You surface relevant past context for an AI assistant. \
         Synthesize the memories below into a short natural-language briefing \
         that answers the memory need. Do not invent details.\n\nQuery: {query}"
    ));

    if let Some(identity) = identity {
        sections.push(format!("Identity:\n{identity}"));
    }

    if let Some(view) = world_view
        && let Some(short_term) = &view.short_term_memory
    {
        sections.push(format!("Recent context:\n{short_term}"));
    }

    sections.push(format!("Memories:\n{}", render_results(results)));
    sections.join("\n\n")
}

/// Plain-text rendering of retrieved memories, newest-style bullets.
fn render_results(results: &[RetrievedMemory]) -> String {
    results
        .iter()
        .map(|memory| {
            let when = memory
                .created_at
                .map(|d| d.to_rfc3339())
                .unwrap_or_default();
            let turns = memory
                .turns
                .iter()
                .map(|t| format!("user: {} / assistant: {}", t.user, t.assistant))
                .collect::<Vec<_>>()
                .join("; ");
            format!(
                "- [{} sim={:.2}] {}",
                when, memory.similarity, turns
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> FetchMemoryRequest {
        FetchMemoryRequest {
            query: "what happened".into(),
            user_id: "u".into(),
            project_id: "p".into(),
            session_id: None,
            limit: None,
            min_similarity: None,
            model: None,
        }
    }

    #[test]
    fn accepts_valid_request() {
        assert!(validate(&request(), 50).is_ok());
    }

    #[test]
    fn rejects_empty_query() {
        let mut r = request();
        r.query = "   ".into();
        assert!(validate(&r, 50).is_err());
    }

    #[test]
    fn rejects_out_of_range_limit() {
        let mut r = request();
        r.limit = Some(0);
        assert!(validate(&r, 50).is_err());
        r.limit = Some(51);
        assert!(validate(&r, 50).is_err());
        r.limit = Some(50);
        assert!(validate(&r, 50).is_ok());
    }

    #[test]
    fn rejects_bad_similarity() {
        let mut r = request();
        r.min_similarity = Some(1.5);
        assert!(validate(&r, 50).is_err());
        r.min_similarity = Some(-0.1);
        assert!(validate(&r, 50).is_err());
        r.min_similarity = Some(0.7);
        assert!(validate(&r, 50).is_ok());
    }
}
