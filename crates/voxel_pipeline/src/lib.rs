//! voxel_pipeline - engine-independent chunk streaming scheduler
//!
//! This crate schedules the production pipeline of an effectively infinite
//! voxel world: each chunk moves through an ordered sequence of asynchronous
//! stages (terrain generation → structure generation → lighting → meshing →
//! collision) without ever blocking the frame loop.
//!
//! # Features
//!
//! - **Per-stage backpressure**: job stages cap in-flight work; priority
//!   buffers smooth bursty completions into that capacity, closest chunks
//!   first
//! - **Neighbor dependencies**: wait stages hold a chunk until its spatial
//!   neighbors catch up, maintained with incremental bitmasks instead of
//!   rescans
//! - **Bidirectional movement**: a chunk regresses to an earlier stage when
//!   its target drops or a dependency breaks; results that arrive late are
//!   discarded, never applied
//! - **Single pipeline thread**: jobs run on rayon's pool, but all scheduler
//!   state is polled and mutated from one thread, so nothing here locks
//!
//! # Example
//!
//! ```ignore
//! use voxel_pipeline::{Adjacency, ChunkId, Job, PipelineBuilder, TargetUpdateMode};
//!
//! let mut pipeline = PipelineBuilder::new()
//!   .buffer_stage("gen_queue", Box::new(|id| -id.0.length_squared() as i64))
//!   .job_stage(
//!     "terrain",
//!     8,
//!     Box::new(|id: ChunkId| Job::spawn(move || generate_terrain(id))),
//!     Box::new(|id, terrain| store_terrain(id, terrain)),
//!   )
//!   .wait_stage("mesh_wait", Adjacency::Faces)
//!   .job_stage(
//!     "mesh",
//!     2,
//!     Box::new(|id: ChunkId| Job::spawn(move || build_mesh(id))),
//!     Box::new(|id, mesh| store_mesh(id, mesh)),
//!   )
//!   .pass_through("complete")
//!   .build();
//!
//! // External demand drives targets; the pipeline converges over ticks.
//! pipeline.set_target_stage(ChunkId::new(0, 0, 0), 3, TargetUpdateMode::Set);
//! loop {
//!   pipeline.update(); // once per frame
//!   if pipeline.all_chunks_in_target_state() {
//!     break;
//!   }
//! }
//! ```

pub mod chunk;
pub mod job;
pub mod pipeline;
pub mod stage;
pub mod state;

// Re-export commonly used items
pub use chunk::{Adjacency, ChunkId, NeighborMask, FACE_OFFSETS, FULL_OFFSETS};
pub use job::Job;
pub use pipeline::{PipelineBuilder, PipelineManager};
pub use stage::{
  AddOutcome, JobStage, NeighborWaitStage, PassThroughStage, PriorityBufferStage, Stage,
  StageCtx,
};
pub use state::{
  ChunkMap, ChunkStageData, PipelineEvent, StageId, TargetUpdateMode, EVICT_TARGET,
};
