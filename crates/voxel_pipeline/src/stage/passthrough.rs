//! Zero-capacity stage: every add forwards immediately or terminates.

use super::{AddOutcome, Stage, StageCtx};
use crate::chunk::ChunkId;
use crate::state::StageId;

/// Hook run for every chunk that passes this point.
pub type PassCallback = Box<dyn FnMut(ChunkId)>;

/// A pipeline position that holds nothing.
///
/// Used for trivial positions, typically "apply a side effect to every chunk
/// that gets this far" (register a collider, notify the renderer), without
/// consuming a slot or a tick.
pub struct PassThroughStage {
  name: String,
  stage_id: StageId,
  on_pass: Option<PassCallback>,
}

impl PassThroughStage {
  pub fn new(name: impl Into<String>, stage_id: StageId) -> Self {
    Self {
      name: name.into(),
      stage_id,
      on_pass: None,
    }
  }

  pub fn with_callback(mut self, on_pass: PassCallback) -> Self {
    self.on_pass = Some(on_pass);
    self
  }
}

impl Stage for PassThroughStage {
  fn name(&self) -> &str {
    &self.name
  }

  fn stage_id(&self) -> StageId {
    self.stage_id
  }

  fn len(&self) -> usize {
    0
  }

  fn contains(&self, _id: ChunkId) -> bool {
    false
  }

  fn add(&mut self, id: ChunkId, ctx: &mut StageCtx) -> AddOutcome {
    if ctx.chunks.terminates_here(id, self.stage_id) {
      return AddOutcome::Terminated;
    }
    if let Some(cb) = &mut self.on_pass {
      cb(id);
    }
    AddOutcome::Forwarded
  }

  fn update(&mut self, _ctx: &mut StageCtx) {}

  fn moving_on(&self) -> &[ChunkId] {
    &[]
  }

  fn going_backward(&self) -> &[ChunkId] {
    &[]
  }

  fn finished_here(&self) -> &[ChunkId] {
    &[]
  }

  fn clear_lists(&mut self) {}
}
