//! The stage contract and the four concrete stage kinds.
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌─────────────┐   ┌────────────┐   ┌─────────────┐
//! │ Priority ├──►│ Job     ├──►│ Neighbor    ├──►│ Priority   ├──►│ Job         │ ...
//! │ Buffer   │   │ (gen)   │   │ Wait        │   │ Buffer     │   │ (mesh)      │
//! └──────────┘   └─────────┘   └─────────────┘   └────────────┘   └─────────────┘
//!   unbounded      capacity      blocks until      releases in      capacity
//!   queue, by      limited,      neighbors         priority order   limited
//!   priority       polls jobs    reach this        up to next
//!                                stage             stage's room
//! ```
//!
//! A stage owns its residents and three per-tick output lists. It never
//! touches another stage's residency; movement between stages is performed by
//! the pipeline manager from the lists after all stages have updated.

pub mod buffer_stage;
pub mod job_stage;
pub mod passthrough;
pub mod wait_stage;

pub use buffer_stage::PriorityBufferStage;
pub use job_stage::JobStage;
pub use passthrough::PassThroughStage;
pub use wait_stage::NeighborWaitStage;

use crate::chunk::ChunkId;
use crate::state::{ChunkMap, PipelineEvent, StageId};

/// Borrowed context handed to a stage while it runs.
///
/// `chunks` is the canonical state table (manager-owned); `events` is the
/// outgoing event queue; `next` is the stage directly after this one, present
/// only during `update` so admission can be checked before release.
pub struct StageCtx<'a> {
  pub chunks: &'a mut ChunkMap,
  pub events: &'a mut Vec<PipelineEvent>,
  pub next: Option<&'a dyn Stage>,
}

/// What happened to an id handed to [`Stage::add`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AddOutcome {
  /// The stage now holds the id.
  Entered,
  /// The id's target is at or below this stage; it was dropped and is
  /// settled where it stands.
  Terminated,
  /// Zero-capacity stage: the id should be handed straight to the next
  /// stage. Only pass-through stages return this.
  Forwarded,
}

/// A named position in the ordered pipeline.
pub trait Stage {
  fn name(&self) -> &str;

  /// Fixed position in the ordered stage list.
  fn stage_id(&self) -> StageId;

  /// Current resident count.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Remaining admission capacity. `usize::MAX` means unbounded.
  fn entry_limit(&self) -> usize {
    usize::MAX
  }

  fn contains(&self, id: ChunkId) -> bool;

  /// Local admission rule beyond raw capacity. Stages with cross-id
  /// dependencies override this.
  fn free_for(&self, id: ChunkId) -> bool {
    !self.contains(id)
  }

  /// Insert `id` unless its target is at or below this stage.
  ///
  /// Adding an id the stage already holds is a contract violation and
  /// asserts.
  fn add(&mut self, id: ChunkId, ctx: &mut StageCtx) -> AddOutcome;

  /// Compute this tick's completions into the output lists.
  ///
  /// Calling `update` twice without an intervening [`clear_lists`]
  /// (`Stage::clear_lists`) is a programming error and asserts.
  fn update(&mut self, ctx: &mut StageCtx);

  /// React to a pipeline event. Default: ignore.
  fn on_event(&mut self, _event: &PipelineEvent, _ctx: &mut StageCtx) {}

  /// Ids that completed this stage this tick and should advance.
  fn moving_on(&self) -> &[ChunkId];

  /// Ids whose upstream dependency broke; they regress one stage.
  fn going_backward(&self) -> &[ChunkId];

  /// Ids that finished here with a target at or below this stage; they
  /// leave residency and settle in place.
  fn finished_here(&self) -> &[ChunkId];

  /// Reset the per-tick lists. Called by the manager once routing is done.
  fn clear_lists(&mut self);

  /// Called once after the full stage list exists.
  fn initialise(&mut self) {}

  /// Tear down, draining any in-flight work synchronously.
  fn dispose(&mut self) {}
}

// =============================================================================
// TickLists - shared per-tick output bookkeeping
// =============================================================================

/// The three per-tick output lists plus the cleared-since-update flag that
/// backs the "update called twice" assertion.
#[derive(Default)]
pub(crate) struct TickLists {
  pub moving_on: Vec<ChunkId>,
  pub going_backward: Vec<ChunkId>,
  pub finished: Vec<ChunkId>,
  updated: bool,
}

impl TickLists {
  /// Assert the lists were cleared since the previous update.
  pub fn begin_update(&mut self, stage_name: &str) {
    assert!(
      !self.updated,
      "stage '{stage_name}' updated twice without clear_lists"
    );
    self.updated = true;
  }

  pub fn clear(&mut self) {
    self.moving_on.clear();
    self.going_backward.clear();
    self.finished.clear();
    self.updated = false;
  }
}
