// src/memory/normalize.rs
// Turn normalization and searchable-text derivation

use serde_json::Value;

use super::types::{ConversationRow, MemoryLogData, MentalNoteData, TurnMetadata, TurnPair};
use crate::icm::compression::Compressor;
use crate::redaction::strip_memory_blocks;

/// Normalize conversation raw_data into ordered user/assistant turn pairs.
///
/// Accepts a bare list of messages, `{ "conversation": [...] }`,
/// `{ "messages": [...] }`, or `{ "memory_log": { "conversation": [...] } }`.
/// Message text is memory-block-stripped; messages without role or text are
/// skipped. A user message pairs with the next assistant message; stragglers
/// become half-empty pairs.
pub fn normalize_turns(conv: &ConversationRow) -> Vec<TurnPair> {
    let mut turns = Vec::new();
    let mut pending_user: Option<String> = None;

    for msg in turn_candidates(&conv.raw_data) {
        let Some(role) = msg.get("role").and_then(Value::as_str).map(str::trim) else {
            continue;
        };
        let text = extract_message_text(msg);
        if role.is_empty() || text.is_empty() {
            continue;
        }

        let timestamp = msg
            .get("timestamp")
            .or_else(|| msg.get("created_at"))
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| conv.created_at.to_rfc3339());

        let metadata = TurnMetadata {
            timestamp: Some(timestamp),
            conversation_id: conv.conversation_id.clone(),
            source: "conversation".to_string(),
        };

        match role {
            "user" => pending_user = Some(text),
            "assistant" => {
                turns.push(TurnPair {
                    user: pending_user.take().unwrap_or_default(),
                    assistant: text,
                    metadata,
                });
            }
            _ => {}
        }
    }

    if let Some(user) = pending_user {
        turns.push(TurnPair {
            user,
            assistant: String::new(),
            metadata: TurnMetadata {
                timestamp: Some(conv.created_at.to_rfc3339()),
                conversation_id: conv.conversation_id.clone(),
                source: "conversation".to_string(),
            },
        });
    }

    turns
}

fn turn_candidates(raw: &Value) -> Vec<&Value> {
    let list = match raw {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("conversation")
            .and_then(Value::as_array)
            .or_else(|| map.get("messages").and_then(Value::as_array))
            .or_else(|| {
                map.get("memory_log")
                    .and_then(|m| m.get("conversation"))
                    .and_then(Value::as_array)
            }),
        _ => None,
    };
    list.map(|items| items.iter().collect()).unwrap_or_default()
}

/// Extract text from the message shapes we accept: `text`, string `content`,
/// a `content` parts list, or a `parts` list. The result is
/// memory-block-stripped.
fn extract_message_text(msg: &Value) -> String {
    let text = if let Some(t) = msg.get("text").and_then(Value::as_str) {
        t.to_string()
    } else if let Some(c) = msg.get("content").and_then(Value::as_str) {
        c.to_string()
    } else if let Some(parts) = msg.get("content").and_then(Value::as_array) {
        join_parts(parts)
    } else if let Some(parts) = msg.get("parts").and_then(Value::as_array) {
        join_parts(parts)
    } else {
        String::new()
    };

    strip_memory_blocks(&text)
}

fn join_parts(parts: &[Value]) -> String {
    parts
        .iter()
        .map(|part| match part {
            Value::Object(map) => map
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Searchable text for a memory log: task, summary, solution approach and up
/// to five key changes, tags, component, and root cause joined with spaces.
/// Falls back to the task, then the literal "untitled".
pub fn memory_log_searchable_text(data: &MemoryLogData) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(task) = &data.task {
        parts.push(task.clone());
    }
    if let Some(summary) = &data.summary {
        parts.push(summary.clone());
    }
    if let Some(solution) = &data.solution {
        if let Some(approach) = &solution.approach {
            parts.push(approach.clone());
        }
        parts.extend(solution.key_changes.iter().take(5).cloned());
    }
    if !data.tags.is_empty() {
        parts.push(data.tags.join(" "));
    }
    if let Some(component) = &data.component {
        parts.push(component.clone());
    }
    if let Some(root_cause) = &data.root_cause {
        parts.push(root_cause.clone());
    }

    let text = parts.join(" ").trim().to_string();
    if text.is_empty() {
        data.task.clone().unwrap_or_else(|| "untitled".to_string())
    } else {
        text
    }
}

/// Searchable text for a mental note is its content.
pub fn mental_note_searchable_text(data: &MentalNoteData) -> String {
    data.content.trim().to_string()
}

/// Embeddable text for a conversation: compressed semantic units when a
/// compressor is given, otherwise a stable JSON encoding of the normalized
/// turn list. None when the conversation has no usable text.
pub fn conversation_embedding_text(
    conv: &ConversationRow,
    compressor: Option<&Compressor>,
) -> Option<String> {
    let turns = normalize_turns(conv);
    if turns.is_empty() {
        return None;
    }

    if let Some(compressor) = compressor {
        let units: Vec<String> = turns
            .iter()
            .map(|t| compressor.compress(&t.user, &t.assistant).semantic_unit)
            .filter(|u| !u.is_empty())
            .collect();
        if !units.is_empty() {
            return Some(units.join("\n"));
        }
    }

    serde_json::to_string(&turns).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn conv(raw: Value) -> ConversationRow {
        ConversationRow {
            id: 1,
            conversation_id: "conv-1".into(),
            user_id: "u".into(),
            project_id: "p".into(),
            session_id: None,
            model: "gpt".into(),
            created_at: Utc::now(),
            raw_data: raw,
        }
    }

    #[test]
    fn pairs_user_and_assistant_messages() {
        let row = conv(serde_json::json!([
            { "role": "user", "text": "hi" },
            { "role": "assistant", "text": "hello" },
            { "role": "user", "text": "bye" },
        ]));

        let turns = normalize_turns(&row);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].user, "hi");
        assert_eq!(turns[0].assistant, "hello");
        assert_eq!(turns[1].user, "bye");
        assert_eq!(turns[1].assistant, "");
    }

    #[test]
    fn accepts_wrapped_shapes() {
        let shapes = [
            serde_json::json!({ "conversation": [{ "role": "user", "text": "a" }] }),
            serde_json::json!({ "messages": [{ "role": "user", "text": "a" }] }),
            serde_json::json!({ "memory_log": { "conversation": [{ "role": "user", "text": "a" }] } }),
        ];
        for raw in shapes {
            assert_eq!(normalize_turns(&conv(raw)).len(), 1);
        }
    }

    #[test]
    fn strips_memory_blocks_from_turn_text() {
        let row = conv(serde_json::json!([
            { "role": "user", "text": "q" },
            { "role": "assistant",
              "text": "[semantix-memory-block]injected[semantix-end-memory-block]answer" },
        ]));

        let turns = normalize_turns(&row);
        assert_eq!(turns[0].assistant, "answer");
    }

    #[test]
    fn content_parts_are_joined() {
        let row = conv(serde_json::json!([
            { "role": "assistant", "content": [{ "text": "part one" }, { "text": "part two" }] },
        ]));
        let turns = normalize_turns(&row);
        assert_eq!(turns[0].assistant, "part one part two");
    }

    #[test]
    fn memory_log_text_combines_fields() {
        let data: MemoryLogData = serde_json::from_value(serde_json::json!({
            "task": "fix login",
            "summary": "token expiry bug",
            "solution": { "approach": "refresh earlier", "key_changes": ["a", "b"] },
            "tags": ["auth", "login"],
            "component": "gateway",
            "root_cause": "clock skew"
        }))
        .unwrap();

        let text = memory_log_searchable_text(&data);
        assert_eq!(
            text,
            "fix login token expiry bug refresh earlier a b auth login gateway clock skew"
        );
    }

    #[test]
    fn memory_log_text_falls_back_to_untitled() {
        let data = MemoryLogData::default();
        assert_eq!(memory_log_searchable_text(&data), "untitled");
    }

    #[test]
    fn key_changes_capped_at_five() {
        let data: MemoryLogData = serde_json::from_value(serde_json::json!({
            "solution": { "key_changes": ["1", "2", "3", "4", "5", "6", "7"] }
        }))
        .unwrap();
        let text = memory_log_searchable_text(&data);
        assert!(text.contains('5'));
        assert!(!text.contains('6'));
    }

    #[test]
    fn conversation_text_prefers_semantic_units() {
        let row = conv(serde_json::json!([
            { "role": "user", "text": "What broke?" },
            { "role": "assistant", "text": "The cache." },
        ]));

        let compressor = Compressor::new();
        let text = conversation_embedding_text(&row, Some(&compressor)).unwrap();
        assert_eq!(text, "What broke -> The cache");

        let fallback = conversation_embedding_text(&row, None).unwrap();
        assert!(fallback.starts_with('['));
    }

    #[test]
    fn empty_conversation_yields_none() {
        let row = conv(serde_json::json!([]));
        assert!(conversation_embedding_text(&row, None).is_none());
    }
}
