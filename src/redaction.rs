// src/redaction.rs
// Memory-block marker redaction, applied at every embed/summarize boundary

/// Opening marker the downstream LLM injects around previously-delivered
/// memory in assistant replies.
pub const MEMORY_BLOCK_START: &str = "[semantix-memory-block]";
/// Closing marker.
pub const MEMORY_BLOCK_END: &str = "[semantix-end-memory-block]";

/// Sentinel phrase that, combined with the block marker, means the upstream
/// model already knows there is nothing to retrieve.
pub const NO_MEMORY_SENTINEL: &str = "No relevant memories found";

/// Remove every `[semantix-memory-block] ... [semantix-end-memory-block]`
/// span (markers inclusive, case-insensitive) and trim the result.
///
/// Injected memory must never be re-embedded or re-summarized; this is the
/// single redaction point for ingestion, retrieval normalization, and the
/// world-view summarizer.
pub fn strip_memory_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;

    while let Some(start) = find_ascii_ci(text, MEMORY_BLOCK_START, pos) {
        let after_start = start + MEMORY_BLOCK_START.len();
        match find_ascii_ci(text, MEMORY_BLOCK_END, after_start) {
            Some(end) => {
                out.push_str(&text[pos..start]);
                pos = end + MEMORY_BLOCK_END.len();
            }
            // Unmatched opener: not a delimited block, leave it as-is.
            None => break,
        }
    }

    out.push_str(&text[pos..]);
    out.trim().to_string()
}

/// True when a required-memory item carries the no-memory sentinel: the
/// literal block marker together with the "No relevant memories found"
/// phrase.
pub fn contains_no_memory_sentinel(text: &str) -> bool {
    text.contains(MEMORY_BLOCK_START) && text.contains(NO_MEMORY_SENTINEL)
}

/// Case-insensitive substring search for an ASCII needle, starting at byte
/// offset `from`. Returns the byte offset of the match.
fn find_ascii_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let ndl = needle.as_bytes();
    if from + ndl.len() > hay.len() {
        return None;
    }
    (from..=hay.len() - ndl.len()).find(|&i| hay[i..i + ndl.len()].eq_ignore_ascii_case(ndl))
}
