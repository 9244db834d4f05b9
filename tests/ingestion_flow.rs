// tests/ingestion_flow.rs
// Event-driven ingestion: embed, vector upsert, backfill semantics

mod test_helpers;

use semantix::events::{
    TOPIC_CONVERSATION_STORED, TOPIC_MEMORY_LOG_STORED, TOPIC_MENTAL_NOTE_STORED,
};
use semantix::memory::types::TenantKey;
use semantix::storage::collections::{SourceKind, collection_name};

#[tokio::test]
async fn memory_log_ingestion_upserts_vector_and_backfills_embedding() {
    let app = test_helpers::test_app().await;
    let tenant = TenantKey::new("u1", "p1");
    let collection = collection_name(&tenant, SourceKind::MemoryLog);

    let raw = serde_json::json!({
        "task": "fix token refresh",
        "summary": "tokens expired too early",
        "tags": ["auth"],
    });
    let row = app
        .primary
        .insert_memory_log(&tenant, "fix token refresh", "assistant", &raw)
        .await
        .unwrap();

    app.event_bus.publish(
        TOPIC_MEMORY_LOG_STORED,
        serde_json::json!({
            "memory_log_id": row.id,
            "task": row.task,
            "agent": row.agent,
            "date": row.created_at,
            "raw_data": row.raw_data,
            "user_id": tenant.user_id,
            "project_id": tenant.project_id,
        }),
    );

    assert!(test_helpers::wait_for_vectors(&app.vectors, &collection, 1).await);

    // Readers tolerate the gap, then see the backfilled column.
    for _ in 0..100 {
        let fetched = app.primary.get_memory_log(row.id).await.unwrap().unwrap();
        if fetched.embedding.is_some() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("embedding column was never backfilled");
}

#[tokio::test]
async fn redelivered_event_yields_one_vector_record() {
    let app = test_helpers::test_app().await;
    let tenant = TenantKey::new("u1", "p1");
    let collection = collection_name(&tenant, SourceKind::Conversation);

    let row = app
        .primary
        .insert_conversation(
            &tenant,
            "conv-1",
            "gpt",
            None,
            &serde_json::json!([{ "role": "user", "text": "note about deploy schedule" }]),
        )
        .await
        .unwrap();

    let payload = serde_json::json!({
        "conversation_db_id": row.id,
        "conversation_id": row.conversation_id,
        "model": row.model,
        "raw_data": row.raw_data,
        "user_id": tenant.user_id,
        "project_id": tenant.project_id,
    });

    app.event_bus.publish(TOPIC_CONVERSATION_STORED, payload.clone());
    app.event_bus.publish(TOPIC_CONVERSATION_STORED, payload);

    assert!(test_helpers::wait_for_vectors(&app.vectors, &collection, 1).await);
    // Give the second delivery time to land, then confirm it did not add.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(app.vectors.count(&collection).await.unwrap(), 1);
}

#[tokio::test]
async fn mental_note_ingestion_embeds_content() {
    let app = test_helpers::test_app().await;
    let tenant = TenantKey::new("u1", "p1");
    let collection = collection_name(&tenant, SourceKind::MentalNote);

    let raw = serde_json::json!({ "content": "user prefers short answers", "note_type": "preference" });
    let row = app
        .primary
        .insert_mental_note(&tenant, "s1", 1_700_000_000_000, &raw)
        .await
        .unwrap();

    app.event_bus.publish(
        TOPIC_MENTAL_NOTE_STORED,
        serde_json::json!({
            "mental_note_id": row.id,
            "session_id": row.session_id,
            "start_time": row.start_time,
            "raw_data": row.raw_data,
            "user_id": tenant.user_id,
            "project_id": tenant.project_id,
        }),
    );

    assert!(test_helpers::wait_for_vectors(&app.vectors, &collection, 1).await);
}

#[tokio::test]
async fn injected_memory_blocks_do_not_affect_embeddings() {
    let app = test_helpers::test_app().await;
    let tenant = TenantKey::new("u1", "p1");
    let collection = collection_name(&tenant, SourceKind::Conversation);

    let visible = "let's plan the database migration";
    let with_block = format!(
        "[semantix-memory-block]stale injected recall[semantix-end-memory-block]{visible}"
    );

    for (conv_id, text) in [("conv-plain", visible.to_string()), ("conv-block", with_block)] {
        let row = app
            .primary
            .insert_conversation(
                &tenant,
                conv_id,
                "gpt",
                None,
                &serde_json::json!([{ "role": "user", "text": text }]),
            )
            .await
            .unwrap();
        app.event_bus.publish(
            TOPIC_CONVERSATION_STORED,
            serde_json::json!({
                "conversation_db_id": row.id,
                "conversation_id": row.conversation_id,
                "model": row.model,
                "raw_data": row.raw_data,
                "user_id": tenant.user_id,
                "project_id": tenant.project_id,
            }),
        );
    }

    assert!(test_helpers::wait_for_vectors(&app.vectors, &collection, 2).await);

    // Both records embed identically to the clean text: the injected block
    // contributed nothing.
    let query = app.embeddings.embed(visible, None).await.unwrap().embedding;
    let hits = app
        .vectors
        .query(&collection, &query, 10, &vec![])
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| (h.similarity - 1.0).abs() < 1e-4));
}

#[tokio::test]
async fn invalid_event_payloads_are_skipped_quietly() {
    let app = test_helpers::test_app().await;
    let tenant = TenantKey::new("u1", "p1");
    let collection = collection_name(&tenant, SourceKind::Conversation);

    // Missing tenant key.
    app.event_bus.publish(
        TOPIC_CONVERSATION_STORED,
        serde_json::json!({
            "conversation_db_id": 1,
            "conversation_id": "c",
            "model": "gpt",
            "raw_data": [{ "role": "user", "text": "hi" }],
            "user_id": "",
            "project_id": "p1",
        }),
    );

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(app.vectors.count(&collection).await.unwrap(), 0);
}
