// src/icm/compression.rs
// Deterministic turn compression into "semantic units"

use crate::redaction::strip_memory_blocks;

/// Maximum characters kept from each side of a turn.
const HEAD_LIMIT: usize = 140;

#[derive(Debug, Clone)]
pub struct CompressedTurn {
    pub semantic_unit: String,
}

/// Compresses one user/assistant exchange into a single compact sentence.
///
/// Deterministic: takes the lead sentence of each side (memory blocks
/// stripped first), truncated to a fixed head length. Used for conversation
/// embedding text and world-view short-term memory when no LLM is
/// configured.
#[derive(Debug, Clone, Default)]
pub struct Compressor;

impl Compressor {
    pub fn new() -> Self {
        Self
    }

    pub fn compress(&self, user_text: &str, assistant_text: &str) -> CompressedTurn {
        let user = head_sentence(&strip_memory_blocks(user_text));
        let assistant = head_sentence(&strip_memory_blocks(assistant_text));

        let semantic_unit = match (user.is_empty(), assistant.is_empty()) {
            (true, true) => String::new(),
            (false, true) => user,
            (true, false) => assistant,
            (false, false) => format!("{user} -> {assistant}"),
        };

        CompressedTurn { semantic_unit }
    }
}

/// First sentence of the text, capped at `HEAD_LIMIT` characters.
fn head_sentence(text: &str) -> String {
    let trimmed = text.trim();
    let sentence_end = trimmed
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?' | '\n'))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());

    trimmed[..sentence_end]
        .trim()
        .chars()
        .take(HEAD_LIMIT)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compresses_both_sides() {
        let compressor = Compressor::new();
        let unit = compressor
            .compress(
                "What was the pgvector bug? It broke last night.",
                "The bug was in sanitize_filters. Fixed by reordering operations.",
            )
            .semantic_unit;
        assert_eq!(
            unit,
            "What was the pgvector bug -> The bug was in sanitize_filters"
        );
    }

    #[test]
    fn handles_one_sided_turns() {
        let compressor = Compressor::new();
        assert_eq!(
            compressor.compress("Just a question", "").semantic_unit,
            "Just a question"
        );
        assert_eq!(compressor.compress("", "").semantic_unit, "");
    }

    #[test]
    fn strips_memory_blocks_before_compressing() {
        let compressor = Compressor::new();
        let unit = compressor
            .compress(
                "hi",
                "[semantix-memory-block]secret[semantix-end-memory-block]hello there",
            )
            .semantic_unit;
        assert!(!unit.contains("secret"));
        assert!(unit.contains("hello there"));
    }

    #[test]
    fn is_deterministic() {
        let compressor = Compressor::new();
        let a = compressor.compress("same input", "same output").semantic_unit;
        let b = compressor.compress("same input", "same output").semantic_unit;
        assert_eq!(a, b);
    }
}
