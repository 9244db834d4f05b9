// src/state.rs
// Application state shared across handlers

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;

use crate::config::SemantixConfig;
use crate::embeddings::{EmbeddingProvider, EmbeddingService};
use crate::events::EventBus;
use crate::events::handlers::{IngestionDeps, register_ingestion_handlers};
use crate::icm::{IdentityProvider, IntentClassifier, TimeClassifier};
use crate::llm::LlmClient;
use crate::memory::pipeline::MemoryPipeline;
use crate::memory::retrieval::RetrievalEngine;
use crate::memory::world_view::WorldViewBuilder;
use crate::storage::VectorIndex;
use crate::storage::mem::MemoryVectorIndex;
use crate::storage::qdrant::QdrantIndex;
use crate::storage::sqlite::PrimaryStore;

/// Application state. Everything is injected through constructors, so the
/// whole stack can be instantiated multiple times in one process.
pub struct AppState {
    pub config: SemantixConfig,
    pub primary: Arc<PrimaryStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub embeddings: Arc<EmbeddingService>,
    pub event_bus: Arc<EventBus>,
    pub ingestion: Arc<IngestionDeps>,
    pub world_view: Arc<WorldViewBuilder>,
    pub pipeline: Arc<MemoryPipeline>,
    pub llm: Option<Arc<LlmClient>>,
}

impl AppState {
    pub async fn initialize(config: SemantixConfig) -> Result<Arc<Self>> {
        info!("Connecting to database: {}", config.database.database_url);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.database_url)
            .await
            .context("failed to connect to primary store")?;

        let primary = Arc::new(PrimaryStore::new(pool));
        primary.run_migrations().await?;

        let vectors: Arc<dyn VectorIndex> = match &config.qdrant.url {
            Some(url) => {
                info!("Vector store: Qdrant at {}", url);
                Arc::new(QdrantIndex::new(url, config.embedding.dimensions)?)
            }
            None => {
                info!("Vector store: in-memory (no QDRANT_URL set)");
                Arc::new(MemoryVectorIndex::new())
            }
        };

        Self::initialize_with(config, primary, vectors).await
    }

    /// Wire the stack on pre-built stores.
    pub async fn initialize_with(
        config: SemantixConfig,
        primary: Arc<PrimaryStore>,
        vectors: Arc<dyn VectorIndex>,
    ) -> Result<Arc<Self>> {
        let event_bus = Arc::new(EventBus::new());

        let provider = EmbeddingProvider::from_config(&config.embedding)?;
        let embeddings = Arc::new(EmbeddingService::new(
            provider,
            &config.embedding,
            &config.cache,
            event_bus.clone(),
        ));

        let ingestion = Arc::new(IngestionDeps::new(
            primary.clone(),
            vectors.clone(),
            embeddings.clone(),
        ));
        register_ingestion_handlers(&event_bus, ingestion.clone());

        let llm = LlmClient::from_config(&config.llm).map(Arc::new);
        if llm.is_none() {
            info!("No LLM configured; summaries and synthesis use deterministic paths");
        }

        let intent_classifier = Arc::new(IntentClassifier::new(config.icm.mode, llm.clone()));
        let time_classifier = Arc::new(TimeClassifier::new(config.icm.mode, llm.clone()));
        let identity = Arc::new(IdentityProvider::new(config.icm.identity_json.clone()));

        let world_view = Arc::new(WorldViewBuilder::new(
            primary.clone(),
            llm.clone(),
            config.world_view.recent_limit,
        ));

        let retrieval = Arc::new(RetrievalEngine::new(
            primary.clone(),
            vectors.clone(),
            embeddings.clone(),
            time_classifier.clone(),
            config.retrieval.default_limit,
            config.world_view.recent_limit,
            config.embedding.batch_concurrency,
        ));

        let pipeline = Arc::new(MemoryPipeline::new(
            primary.clone(),
            retrieval,
            intent_classifier,
            time_classifier,
            identity,
            world_view.clone(),
        ));

        Ok(Arc::new(Self {
            config,
            primary,
            vectors,
            embeddings,
            event_bus,
            ingestion,
            world_view,
            pipeline,
            llm,
        }))
    }
}
