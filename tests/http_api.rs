// tests/http_api.rs
// HTTP surface contract tests

mod test_helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use semantix::api::http::http_router;
use tower::util::ServiceExt;

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_provider_and_cache() {
    let app = test_helpers::test_app().await;
    let router = http_router(app);

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["embedding_provider"]["provider"], "local");
    assert!(body["cache"]["max_size"].is_number());
}

#[tokio::test]
async fn fetch_memory_validates_input() {
    let app = test_helpers::test_app().await;

    let cases = [
        serde_json::json!({ "query": "  ", "user_id": "u", "project_id": "p" }),
        serde_json::json!({ "query": "q", "user_id": "", "project_id": "p" }),
        serde_json::json!({ "query": "q", "user_id": "u", "project_id": "p", "limit": 0 }),
        serde_json::json!({ "query": "q", "user_id": "u", "project_id": "p", "limit": 99 }),
        serde_json::json!({ "query": "q", "user_id": "u", "project_id": "p", "min_similarity": 2.0 }),
    ];

    for case in cases {
        let router = http_router(app.clone());
        let response = router.oneshot(post_json("/fetch-memory", case)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn fetch_memory_returns_no_memories_literal() {
    let app = test_helpers::test_app().await;
    let router = http_router(app);

    let response = router
        .oneshot(post_json(
            "/fetch-memory",
            serde_json::json!({
                "query": "hello!",
                "user_id": "u1",
                "project_id": "p1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["memory"], "No relevant memories found.");
}

#[tokio::test]
async fn store_and_query_round_trip() {
    let app = test_helpers::test_app().await;

    // Store a conversation through the writer endpoint.
    let router = http_router(app.clone());
    let response = router
        .oneshot(post_json(
            "/conversations",
            serde_json::json!({
                "user_id": "u1",
                "project_id": "p1",
                "model": "gpt",
                "raw_data": [{ "role": "user", "text": "remember the release checklist review" }],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ok"], true);

    let tenant = semantix::memory::types::TenantKey::new("u1", "p1");
    let collection = semantix::storage::collections::collection_name(
        &tenant,
        semantix::storage::collections::SourceKind::Conversation,
    );
    assert!(test_helpers::wait_for_vectors(&app.vectors, &collection, 1).await);

    // Query it back with a relaxed similarity floor.
    let router = http_router(app.clone());
    let response = router
        .oneshot(post_json(
            "/fetch-memory",
            serde_json::json!({
                "query": "what did we say about the release checklist review",
                "user_id": "u1",
                "project_id": "p1",
                "min_similarity": 0.3,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let memory = body["memory"].as_str().unwrap();
    assert_ne!(memory, "No relevant memories found.");
    assert!(memory.contains("release checklist"));
}

#[tokio::test]
async fn world_view_endpoint_returns_payload() {
    let app = test_helpers::test_app().await;

    let tenant = semantix::memory::types::TenantKey::new("u1", "p1");
    app.primary
        .insert_conversation(
            &tenant,
            "conv-1",
            "gpt",
            Some("s1"),
            &serde_json::json!([{ "role": "user", "text": "hi" }]),
        )
        .await
        .unwrap();

    let router = http_router(app);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/world-view?user_id=u1&project_id=p1&session_id=s1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["conversation_count"], 1);
    assert_eq!(body["is_first_conversation"], true);
    assert_eq!(body["recent_conversations"].as_array().unwrap().len(), 1);
    assert_eq!(body["is_cached"], false);
}
