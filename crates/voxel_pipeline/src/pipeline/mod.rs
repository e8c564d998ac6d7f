//! Chunk pipeline orchestration.
//!
//! ```text
//! set_target_stage(id, t, mode)          update()  (once per frame)
//!        │                                   │
//!        ▼                                   ▼
//! ┌──────────────┐   events   ┌──────────────────────────────────────────┐
//! │  ChunkMap    │◄──────────►│ stage 0 → stage 1 → ... → stage N-1      │
//! │ (id → state) │            │   updates ascending, then routing        │
//! └──────────────┘            └──────────────────────────────────────────┘
//! ```
//!
//! External collaborators (play-area bookkeeping, generators, the chunk
//! record store) talk to [`PipelineManager`]; stages talk only to the state
//! table and the event bus.

pub mod builder;
pub mod manager;

pub use builder::PipelineBuilder;
pub use manager::PipelineManager;

// Test utilities
#[cfg(test)]
pub mod test_utils;
