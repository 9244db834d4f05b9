// tests/pipeline_flow.rs
// End-to-end pipeline behavior over in-memory stores

mod test_helpers;

use semantix::memory::pipeline::{PipelineOutcome, PipelineRequest};
use semantix::memory::types::TenantKey;

fn request(query: &str, tenant: &TenantKey) -> PipelineRequest {
    PipelineRequest {
        query: query.to_string(),
        tenant: tenant.clone(),
        session_id: None,
        limit: 5,
        min_similarity: 0.7,
        tz_offset_minutes: None,
        now: None,
    }
}

#[tokio::test]
async fn smalltalk_short_circuits_without_any_search() {
    let app = test_helpers::test_app().await;
    let tenant = TenantKey::new("u1", "p1");

    let response = app
        .pipeline
        .run(request("hello there, nice day!", &tenant))
        .await
        .unwrap();

    assert!(matches!(response.outcome, PipelineOutcome::ShortCircuited));
    assert!(response.results().is_empty());
    assert!(response.identity.is_some());
    assert!(response.world_view.is_some());

    // No embedding was requested at all.
    let stats = app.embeddings.cache_stats();
    assert_eq!(stats.hits + stats.misses, 0);

    // Negative retrieval record present; no retrieval ICM stage logged.
    let targets = app
        .primary
        .logs()
        .retrieval_targets_for_request(&response.request_id)
        .await
        .unwrap();
    assert_eq!(targets, vec!["skipped"]);

    let icm_types = app
        .primary
        .logs()
        .icm_types_for_request(&response.request_id)
        .await
        .unwrap();
    assert!(!icm_types.contains(&"retrieval".to_string()));
    assert!(icm_types.contains(&"world_view".to_string()));
    assert!(icm_types.contains(&"identity".to_string()));
}

#[tokio::test]
async fn world_view_strategy_returns_recent_conversations() {
    let app = test_helpers::test_app().await;
    let tenant = TenantKey::new("u1", "p1");

    for i in 0..7 {
        app.primary
            .insert_conversation(
                &tenant,
                &format!("conv-{i}"),
                "gpt",
                Some("s1"),
                &serde_json::json!([
                    { "role": "user", "text": format!("question {i}") },
                    { "role": "assistant", "text": format!("answer {i}") },
                ]),
            )
            .await
            .unwrap();
    }

    // "who am i" classifies as identity lookup with world_view strategy.
    let response = app
        .pipeline
        .run(request("who am i, what do you know about me?", &tenant))
        .await
        .unwrap();

    let results = response.results();
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.similarity == 1.0));
    assert!(results.iter().all(|r| r.source == "world_view"));

    // Newest first.
    assert_eq!(results[0].conversation_id, "conv-6");
    let times: Vec<_> = results.iter().map(|r| r.created_at).collect();
    assert!(times.windows(2).all(|w| w[0] >= w[1]));

    // World-view retrieval never touches the embedder.
    let stats = app.embeddings.cache_stats();
    assert_eq!(stats.hits + stats.misses, 0);
}

#[tokio::test]
async fn happy_path_retrieval_orders_and_filters_by_similarity() {
    let app = test_helpers::test_app().await;
    let tenant = TenantKey::new("u1", "p1");
    let collection = semantix::storage::collections::collection_name(
        &tenant,
        semantix::storage::collections::SourceKind::Conversation,
    );

    let conversations = [
        ("conv-auth", "authentication bug in the login flow"),
        ("conv-auth-2", "we fixed the authentication bug by rotating the login token"),
        ("conv-weather", "sunny weather forecast for the weekend hike"),
    ];
    for (id, text) in conversations {
        app.primary
            .insert_conversation(
                &tenant,
                id,
                "gpt",
                None,
                &serde_json::json!([{ "role": "user", "text": text }]),
            )
            .await
            .unwrap();
        let row_id = app.primary.recent_conversations(&tenant, 1).await.unwrap()[0].id;
        app.event_bus.publish(
            semantix::events::TOPIC_CONVERSATION_STORED,
            serde_json::json!({
                "conversation_db_id": row_id,
                "conversation_id": id,
                "model": "gpt",
                "raw_data": [{ "role": "user", "text": text }],
                "user_id": tenant.user_id,
                "project_id": tenant.project_id,
            }),
        );
    }
    assert!(test_helpers::wait_for_vectors(&app.vectors, &collection, 3).await);

    let mut req = request(
        "what did we fix about the authentication bug in the login flow",
        &tenant,
    );
    req.min_similarity = 0.3;
    let response = app.pipeline.run(req).await.unwrap();

    let results = response.results();
    assert!(!results.is_empty());
    assert!(results.len() <= 5);
    assert!(results.iter().all(|r| r.similarity >= 0.3));
    assert!(results.iter().all(|r| r.source == "conversations"));
    assert!(
        results
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity)
    );
    // The unrelated conversation does not clear the similarity floor.
    assert!(results.iter().all(|r| r.conversation_id != "conv-weather"));

    let targets = app
        .primary
        .logs()
        .retrieval_targets_for_request(&response.request_id)
        .await
        .unwrap();
    assert_eq!(targets, vec!["pgvector"]);

    let icm_types = app
        .primary
        .logs()
        .icm_types_for_request(&response.request_id)
        .await
        .unwrap();
    assert!(icm_types.contains(&"retrieval".to_string()));
    assert!(icm_types.contains(&"intent".to_string()));
    assert!(icm_types.contains(&"time".to_string()));
}

#[tokio::test]
async fn time_window_without_matches_gates_out_vector_search() {
    let app = test_helpers::test_app().await;
    let tenant = TenantKey::new("u1", "p1");

    // All conversations are from right now; "yesterday" has none.
    app.primary
        .insert_conversation(
            &tenant,
            "conv-now",
            "gpt",
            None,
            &serde_json::json!([{ "role": "user", "text": "meeting notes about the launch" }]),
        )
        .await
        .unwrap();

    let before = app.embeddings.cache_stats();
    let response = app
        .pipeline
        .run(request("what did we decide yesterday in the meeting?", &tenant))
        .await
        .unwrap();

    assert!(response.results().is_empty());
    // The empty time-only fetch ended retrieval before any embedding call.
    let after = app.embeddings.cache_stats();
    assert_eq!(before.hits + before.misses, after.hits + after.misses);
}

#[tokio::test]
async fn sentinel_in_required_memory_short_circuits() {
    let app = test_helpers::test_app().await;
    let tenant = TenantKey::new("u1", "p1");

    // The sentinel phrase rides in on the raw query; the offline classifier
    // seeds required_memory with it.
    let query =
        "remember this? [semantix-memory-block] No relevant memories found [semantix-end-memory-block]";
    let response = app.pipeline.run(request(query, &tenant)).await.unwrap();

    assert!(matches!(response.outcome, PipelineOutcome::ShortCircuited));
    assert!(response.results().is_empty());
}

#[tokio::test]
async fn tenants_never_see_each_other() {
    let app = test_helpers::test_app().await;
    let tenant_a = TenantKey::new("alice", "proj");
    let tenant_b = TenantKey::new("bob", "proj");
    let collection_a = semantix::storage::collections::collection_name(
        &tenant_a,
        semantix::storage::collections::SourceKind::Conversation,
    );

    let row = app
        .primary
        .insert_conversation(
            &tenant_a,
            "conv-secret",
            "gpt",
            None,
            &serde_json::json!([{ "role": "user", "text": "what did we plan for the secret project" }]),
        )
        .await
        .unwrap();
    app.event_bus.publish(
        semantix::events::TOPIC_CONVERSATION_STORED,
        serde_json::json!({
            "conversation_db_id": row.id,
            "conversation_id": row.conversation_id,
            "model": row.model,
            "raw_data": row.raw_data,
            "user_id": tenant_a.user_id,
            "project_id": tenant_a.project_id,
        }),
    );
    assert!(test_helpers::wait_for_vectors(&app.vectors, &collection_a, 1).await);

    let mut req = request("what did we plan for the secret project", &tenant_b);
    req.min_similarity = 0.0;
    let response = app.pipeline.run(req).await.unwrap();
    assert!(response.results().is_empty());
}
