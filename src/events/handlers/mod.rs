// src/events/handlers/mod.rs
// Ingestion handlers: extract -> embed -> vector-upsert -> backfill

mod conversation;
mod memory_log;
mod mental_note;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::embeddings::EmbeddingService;
use crate::events::{
    EventBus, TOPIC_CONVERSATION_STORED, TOPIC_MEMORY_LOG_STORED, TOPIC_MENTAL_NOTE_STORED,
};
use crate::icm::Compressor;
use crate::storage::VectorIndex;
use crate::storage::sqlite::PrimaryStore;

pub use conversation::ConversationHandler;
pub use memory_log::MemoryLogHandler;
pub use mental_note::MentalNoteHandler;

/// Shared dependencies for the three ingestion handlers.
///
/// Handler failures never propagate to the producer: the source record is
/// already durable in the primary store when the event fires. Fatal
/// failures (embed, vector upsert) are logged and counted; backfill
/// failures are logged only.
pub struct IngestionDeps {
    pub primary: Arc<PrimaryStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub embeddings: Arc<EmbeddingService>,
    pub compressor: Compressor,
    errors: AtomicU64,
}

impl IngestionDeps {
    pub fn new(
        primary: Arc<PrimaryStore>,
        vectors: Arc<dyn VectorIndex>,
        embeddings: Arc<EmbeddingService>,
    ) -> Self {
        Self {
            primary,
            vectors,
            embeddings,
            compressor: Compressor::new(),
            errors: AtomicU64::new(0),
        }
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Subscribe all three handlers to their topics.
pub fn register_ingestion_handlers(bus: &EventBus, deps: Arc<IngestionDeps>) {
    bus.subscribe(
        TOPIC_MEMORY_LOG_STORED,
        "memory_log_handler",
        Arc::new(MemoryLogHandler::new(deps.clone())),
    );
    bus.subscribe(
        TOPIC_MENTAL_NOTE_STORED,
        "mental_note_handler",
        Arc::new(MentalNoteHandler::new(deps.clone())),
    );
    bus.subscribe(
        TOPIC_CONVERSATION_STORED,
        "conversation_handler",
        Arc::new(ConversationHandler::new(deps)),
    );
}
