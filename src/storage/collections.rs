// src/storage/collections.rs
// Deterministic per-tenant collection naming

use sha2::{Digest, Sha256};

use crate::memory::types::TenantKey;

/// Naming scheme version, embedded in every collection name so a deployment
/// mixing versions is detectable by listing collections.
pub const NAMING_VERSION: &str = "v1";

/// What kind of source record a vector collection holds. Conversations use
/// a collection distinct from memory logs and mental notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    MemoryLog,
    MentalNote,
    Conversation,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::MemoryLog => "memory_log",
            SourceKind::MentalNote => "mental_note",
            SourceKind::Conversation => "conversation",
        }
    }

    fn collection_prefix(&self) -> &'static str {
        match self {
            SourceKind::MemoryLog => "memory_logs",
            SourceKind::MentalNote => "mental_notes",
            SourceKind::Conversation => "conversations",
        }
    }
}

/// Collection name for a tenant and source kind:
/// `{prefix}_{version}_{hex16(sha256("{version}:{user}\x1f{project}"))}`.
///
/// Pure and stable across restarts; the unit separator keeps
/// ("ab","c") and ("a","bc") from colliding.
pub fn collection_name(tenant: &TenantKey, kind: SourceKind) -> String {
    let mut hasher = Sha256::new();
    hasher.update(NAMING_VERSION.as_bytes());
    hasher.update(b":");
    hasher.update(tenant.user_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(tenant.project_id.as_bytes());
    let digest = hasher.finalize();

    let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("{}_{}_{}", kind.collection_prefix(), NAMING_VERSION, hex)
}
