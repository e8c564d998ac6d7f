//! Stage that gates advancement on spatial neighbors reaching this stage.
//!
//! Readiness is maintained incrementally: each topology change (a neighbor
//! arriving here, regressing below here, or leaving the pipeline) flips one
//! bit in the masks of the O(neighbors) chunks that care, so a tick never
//! rescans the full resident set.
//!
//! The stage also keeps maintaining masks for chunks that have already passed
//! it. When such a chunk loses a neighbor, the stage publishes
//! [`PipelineEvent::PreconditionFailed`] so the buffer stage after it can
//! yank the chunk back instead of letting it advance on stale data.

use std::collections::HashMap;

use tracing::trace;

use super::{AddOutcome, Stage, StageCtx, TickLists};
use crate::chunk::{Adjacency, ChunkId, NeighborMask};
use crate::state::{PipelineEvent, StageId};

/// Optional hook fired for each chunk whose wait completes.
pub type WaitCallback = Box<dyn FnMut(ChunkId)>;

/// Blocks a chunk until every neighbor (under `adjacency`) has reached at
/// least this stage.
pub struct NeighborWaitStage {
  name: String,
  stage_id: StageId,
  adjacency: Adjacency,
  /// Residents still waiting, with their readiness masks.
  waiting: HashMap<ChunkId, NeighborMask>,
  /// Chunks that passed this stage; masks kept live so a broken dependency
  /// can be detected and reported downstream.
  passed: HashMap<ChunkId, NeighborMask>,
  /// Residents whose mask reached all-zero since the last update. Entries
  /// may be stale; `update` re-validates before releasing.
  ready: Vec<ChunkId>,
  on_complete: Option<WaitCallback>,
  lists: TickLists,
}

impl NeighborWaitStage {
  pub fn new(name: impl Into<String>, stage_id: StageId, adjacency: Adjacency) -> Self {
    Self {
      name: name.into(),
      stage_id,
      adjacency,
      waiting: HashMap::new(),
      passed: HashMap::new(),
      ready: Vec::new(),
      on_complete: None,
      lists: TickLists::default(),
    }
  }

  pub fn with_callback(mut self, on_complete: WaitCallback) -> Self {
    self.on_complete = Some(on_complete);
    self
  }

  pub fn adjacency(&self) -> Adjacency {
    self.adjacency
  }

  /// A neighbor of `tracked` changed; flip the corresponding bit.
  ///
  /// Returns the direction index if `changed` actually neighbors `tracked`.
  fn direction_of(&self, tracked: ChunkId, changed: ChunkId) -> Option<usize> {
    self.adjacency.direction_index(changed.0 - tracked.0)
  }

  /// `id` now certifies as ready (it reached this stage): clear its bit in
  /// every tracked neighbor's mask.
  fn mark_neighbor_ready(&mut self, id: ChunkId) {
    for tracked in id.neighbors(self.adjacency) {
      let Some(dir) = self.direction_of(tracked, id) else {
        continue;
      };
      if let Some(mask) = self.waiting.get_mut(&tracked) {
        let was_ready = mask.all_valid();
        mask.set_ready(dir);
        if !was_ready && mask.all_valid() {
          self.ready.push(tracked);
        }
      }
      if let Some(mask) = self.passed.get_mut(&tracked) {
        mask.set_ready(dir);
      }
    }
  }

  /// `id` no longer certifies as ready: set its bit in every tracked
  /// neighbor's mask, reopening waits and failing passed chunks.
  fn mark_neighbor_lost(&mut self, id: ChunkId, ctx: &mut StageCtx) {
    for tracked in id.neighbors(self.adjacency) {
      let Some(dir) = self.direction_of(tracked, id) else {
        continue;
      };
      if let Some(mask) = self.waiting.get_mut(&tracked) {
        mask.set_waiting(dir);
      }
      if let Some(mask) = self.passed.get_mut(&tracked) {
        let was_ready = mask.all_valid();
        mask.set_waiting(dir);
        if was_ready {
          trace!(
            stage = %self.name,
            chunk = %tracked,
            lost = %id,
            "dependency broke after pass-through"
          );
          ctx.events.push(PipelineEvent::PreconditionFailed {
            id: tracked,
            stage: self.stage_id,
          });
        }
      }
    }
  }

  /// Compute a fresh mask for `id` from the canonical state table.
  fn initial_mask(&self, id: ChunkId, ctx: &StageCtx) -> NeighborMask {
    let mut mask = NeighborMask::all_ready();
    for (dir, neighbor) in id.neighbors(self.adjacency).iter().enumerate() {
      if !ctx.chunks.min_stage_greater_than(*neighbor, self.stage_id - 1) {
        mask.set_waiting(dir);
      }
    }
    mask
  }
}

impl Stage for NeighborWaitStage {
  fn name(&self) -> &str {
    &self.name
  }

  fn stage_id(&self) -> StageId {
    self.stage_id
  }

  fn len(&self) -> usize {
    self.waiting.len()
  }

  fn contains(&self, id: ChunkId) -> bool {
    self.waiting.contains_key(&id)
  }

  fn add(&mut self, id: ChunkId, ctx: &mut StageCtx) -> AddOutcome {
    assert!(
      !self.waiting.contains_key(&id),
      "duplicate add of {id} to wait stage '{}'",
      self.name
    );

    // Reaching this stage at all certifies `id` for its neighbors, whether
    // or not it terminates here.
    self.mark_neighbor_ready(id);

    if ctx.chunks.terminates_here(id, self.stage_id) {
      self.passed.remove(&id);
      return AddOutcome::Terminated;
    }

    // Re-entry from downstream: the live mask is replaced by a fresh one.
    self.passed.remove(&id);

    let mask = self.initial_mask(id, ctx);
    if mask.all_valid() {
      self.ready.push(id);
    }
    self.waiting.insert(id, mask);
    AddOutcome::Entered
  }

  fn update(&mut self, ctx: &mut StageCtx) {
    self.lists.begin_update(&self.name);

    // Residents whose target regressed to or below this stage terminate in
    // place. Their masks may never clear (evicted chunks wait on neighbors
    // that will never arrive), so this cannot be left to the ready queue.
    {
      let stage_id = self.stage_id;
      let Self { waiting, lists, .. } = self;
      waiting.retain(|id, _| {
        if ctx.chunks.terminates_here(*id, stage_id) {
          lists.finished.push(*id);
          false
        } else {
          true
        }
      });
    }

    let mut room = ctx.next.map_or(usize::MAX, |n| n.entry_limit());
    let mut still_ready: Vec<ChunkId> = Vec::new();

    for id in std::mem::take(&mut self.ready) {
      // The mask may have flipped back between being queued and this tick;
      // this recheck is correctness-critical, not redundant.
      let Some(mask) = self.waiting.get(&id) else {
        continue;
      };
      if !mask.all_valid() {
        continue;
      }

      if ctx.chunks.terminates_here(id, self.stage_id) {
        self.waiting.remove(&id);
        self.lists.finished.push(id);
        continue;
      }

      if room == 0 || !ctx.next.is_none_or(|n| n.free_for(id)) {
        // Ready but no room downstream; retry next tick.
        still_ready.push(id);
        continue;
      }

      let mask = self.waiting.remove(&id).expect("ready id vanished");
      self.passed.insert(id, mask);
      self.lists.moving_on.push(id);
      room = room.saturating_sub(1);
      if let Some(cb) = &mut self.on_complete {
        cb(id);
      }
    }

    self.ready = still_ready;
  }

  fn on_event(&mut self, event: &PipelineEvent, ctx: &mut StageCtx) {
    match *event {
      PipelineEvent::ChunkAdded { id, stage } => {
        if stage >= self.stage_id {
          self.mark_neighbor_ready(id);
        }
      }
      PipelineEvent::MinStageDecreased { id, stage } => {
        if stage < self.stage_id {
          // The chunk itself is headed below this stage: it is no longer
          // downstream, so stop policing its dependencies.
          self.passed.remove(&id);
          self.mark_neighbor_lost(id, ctx);
        }
      }
      PipelineEvent::ChunkRemoved { id } => {
        self.waiting.remove(&id);
        self.passed.remove(&id);
        // A lost neighbor always reopens the wait.
        self.mark_neighbor_lost(id, ctx);
      }
      PipelineEvent::PreconditionFailed { .. } => {}
    }
  }

  fn moving_on(&self) -> &[ChunkId] {
    &self.lists.moving_on
  }

  fn going_backward(&self) -> &[ChunkId] {
    &self.lists.going_backward
  }

  fn finished_here(&self) -> &[ChunkId] {
    &self.lists.finished
  }

  fn clear_lists(&mut self) {
    self.lists.clear();
  }

  fn dispose(&mut self) {
    self.waiting.clear();
    self.passed.clear();
    self.ready.clear();
  }
}

#[cfg(test)]
#[path = "wait_stage_test.rs"]
mod wait_stage_test;
