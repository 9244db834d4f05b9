// src/icm/identity.rs
// Always-available tenant identity payload

use serde_json::{Value, json};
use tracing::warn;

/// Returns an identity payload for a user/project. Fetched unconditionally
/// at pipeline start so the downstream model never replies without basic
/// user/assistant context. Never fails: with no configured profile it emits
/// a minimal skeleton.
pub struct IdentityProvider {
    identity_json: Option<String>,
}

impl IdentityProvider {
    pub fn new(identity_json: Option<String>) -> Self {
        Self { identity_json }
    }

    pub fn get_identity(&self, user_id: Option<&str>, project_id: Option<&str>) -> Value {
        if let Some(raw) = &self.identity_json {
            match serde_json::from_str::<Value>(raw) {
                Ok(parsed) => return with_tenant(parsed, user_id, project_id),
                Err(e) => warn!("Failed to parse configured identity JSON: {}", e),
            }
        }

        with_tenant(
            json!({
                "user_identity": {
                    "role": "user",
                    "goals": [],
                    "preferences": [],
                    "constraints": [],
                    "tone": "concise and clear",
                },
                "assistant_identity": {
                    "role": "assistant",
                    "style": "helpful, direct, precise",
                    "safety": "respect privacy; avoid hallucination; ask before assuming",
                },
                "system_policies": [],
                "recent_profile_events": [],
            }),
            user_id,
            project_id,
        )
    }
}

fn with_tenant(mut payload: Value, user_id: Option<&str>, project_id: Option<&str>) -> Value {
    if let Some(map) = payload.as_object_mut() {
        map.entry("user_id")
            .or_insert_with(|| user_id.map(Into::into).unwrap_or(Value::Null));
        map.entry("project_id")
            .or_insert_with(|| project_id.map(Into::into).unwrap_or(Value::Null));
    }
    payload
}
