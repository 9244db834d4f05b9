// src/icm/intent.rs
// Intent classification: what to retrieve and how

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::IcmMode;
use crate::error::{MemoryError, Result};
use crate::llm::LlmClient;

/// Which retrieval backend and gating the pipeline should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    #[default]
    None,
    Conversations,
    Hybrid,
    WorldView,
}

impl RetrievalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::None => "none",
            RetrievalStrategy::Conversations => "conversations",
            RetrievalStrategy::Hybrid => "hybrid",
            RetrievalStrategy::WorldView => "world_view",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FallbackIntent {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub route: String,
}

/// Intent classification result. Shape is fixed regardless of mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f32,
    pub route: String,
    #[serde(default)]
    pub required_memory: Vec<String>,
    #[serde(default)]
    pub retrieval_strategy: RetrievalStrategy,
    #[serde(default)]
    pub entities: Vec<Value>,
    #[serde(default)]
    pub fallback: FallbackIntent,
    #[serde(default)]
    pub notes: String,
}

const EPISODIC_KEYWORDS: &[&str] = &[
    "what did",
    "what happened",
    "what was",
    "plan",
    "decide",
    "decided",
    "talk about",
    "discussed",
    "remember",
    "yesterday",
    "last week",
    "last time",
];

const IDENTITY_KEYWORDS: &[&str] = &["who am i", "identity", "profile", "about me"];

/// Maps user text to an intent, required-memory statements, and a retrieval
/// strategy. Pure: the same text always classifies the same way (offline
/// mode), or is a single prompted call (LLM mode).
pub struct IntentClassifier {
    mode: IcmMode,
    llm: Option<Arc<LlmClient>>,
}

impl IntentClassifier {
    pub fn new(mode: IcmMode, llm: Option<Arc<LlmClient>>) -> Self {
        Self { mode, llm }
    }

    pub async fn classify(&self, text: &str) -> Result<IntentResult> {
        match self.mode {
            IcmMode::Offline => Ok(Self::classify_offline(text)),
            IcmMode::Llm => self.classify_llm(text).await,
        }
    }

    /// Deterministic keyword heuristic with the same output schema as the
    /// prompted model.
    fn classify_offline(text: &str) -> IntentResult {
        let lower = text.to_lowercase();

        let (intent, route, required_memory, strategy) =
            if IDENTITY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                (
                    "identity_lookup",
                    "retrieve",
                    Vec::new(),
                    RetrievalStrategy::WorldView,
                )
            } else if EPISODIC_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                (
                    "episodic_lookup",
                    "retrieve",
                    vec![text.trim().to_string()],
                    RetrievalStrategy::Conversations,
                )
            } else {
                ("unknown", "triage", Vec::new(), RetrievalStrategy::None)
            };

        debug!(intent, strategy = strategy.as_str(), "Offline intent classification");

        IntentResult {
            intent: intent.to_string(),
            confidence: if intent == "unknown" { 0.3 } else { 0.82 },
            route: route.to_string(),
            required_memory,
            retrieval_strategy: strategy,
            entities: Vec::new(),
            fallback: FallbackIntent {
                intent: "unknown".to_string(),
                route: "triage".to_string(),
            },
            notes: "offline heuristic".to_string(),
        }
    }

    async fn classify_llm(&self, text: &str) -> Result<IntentResult> {
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| MemoryError::Classifier("LLM mode without LLM client".into()))?;

        let prompt = format!(
            "Classify the user's message for a conversational memory system.\n\
             Respond with only a JSON object with fields:\n\
             intent (string), confidence (0..1), route (string),\n\
             required_memory (array of short natural-language memory-need statements),\n\
             retrieval_strategy (one of \"none\", \"conversations\", \"hybrid\", \"world_view\"),\n\
             entities (array of objects), fallback (object with intent and route),\n\
             notes (string).\n\nMessage: {text}"
        );

        let raw = llm
            .generate_json(&prompt)
            .await
            .map_err(|e| MemoryError::Classifier(e.to_string()))?;

        serde_json::from_value(raw)
            .map_err(|e| MemoryError::Classifier(format!("bad intent schema: {e}")))
    }
}
