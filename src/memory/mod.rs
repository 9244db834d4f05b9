// src/memory/mod.rs
// The memory pipeline and its collaborators

pub mod normalize;
pub mod pipeline;
pub mod retrieval;
pub mod session;
pub mod types;
pub mod world_view;

pub use pipeline::{MemoryPipeline, PipelineOutcome, PipelineRequest, PipelineResponse};
pub use retrieval::{RetrievalEngine, RetrievalRequest};
pub use types::{RetrievedMemory, TenantKey};
pub use world_view::{WorldView, WorldViewBuilder};
