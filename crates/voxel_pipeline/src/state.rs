//! Canonical per-chunk pipeline state and the events stages react to.
//!
//! The [`ChunkMap`] is owned exclusively by the pipeline manager; stages only
//! read it through the borrow handed to them in a [`StageCtx`]
//! (`crate::stage::StageCtx`). This single-owner discipline is what keeps the
//! whole scheduler lock-free on one thread.

use std::collections::HashMap;

use crate::chunk::ChunkId;

/// Position in the ordered stage list. Stage 0 is entry; `N-1` is "fully
/// complete". Targets may legally be driven below 0 to evict a chunk.
pub type StageId = i32;

/// Target value that drains a chunk out of the pipeline entirely.
pub const EVICT_TARGET: StageId = -1;

/// How a new target stage combines with the existing one.
///
/// Multiple external actors race to request targets for the same id (view
/// distance rings, collision radius, explicit loads); the mode makes each
/// write's intent explicit instead of relying on caller discipline.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TargetUpdateMode {
  /// Replace unconditionally.
  Set,
  /// Apply only if the new target is greater than the old.
  UpgradeOnly,
  /// Apply only if the new target is less than the old.
  DowngradeOnly,
}

/// Per-chunk scheduling record.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ChunkStageData {
  /// Stage the chunk currently resides in (or last completed, once settled).
  pub current_stage: StageId,

  /// Stage the chunk should eventually reach. May be below `current_stage`
  /// while the chunk drains backward.
  pub target_stage: StageId,

  /// Conservative lower bound `min(current, target)`.
  ///
  /// Wait stages certify a neighbor as ready by checking this bound: it only
  /// decreases when a regression is scheduled, so dependents never trust a
  /// chunk that is about to lose data.
  pub min_stage: StageId,
}

impl ChunkStageData {
  pub fn new(current_stage: StageId, target_stage: StageId) -> Self {
    Self {
      current_stage,
      target_stage,
      min_stage: current_stage.min(target_stage),
    }
  }

  /// Recompute `min_stage`. Returns `true` if the bound decreased.
  pub fn refresh_min_stage(&mut self) -> bool {
    let next = self.current_stage.min(self.target_stage);
    if next < self.min_stage {
      self.min_stage = next;
      true
    } else {
      self.min_stage = next;
      false
    }
  }
}

// =============================================================================
// PipelineEvent - typed event bus payloads
// =============================================================================

/// Events published by the pipeline manager (and, for
/// `PreconditionFailed`, by wait stages) and delivered to every stage.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PipelineEvent {
  /// A chunk entered the pipeline, at the given stage.
  ChunkAdded { id: ChunkId, stage: StageId },

  /// A chunk fully left the pipeline; its state record is gone.
  ChunkRemoved { id: ChunkId },

  /// A chunk's `min_stage` bound dropped to `stage`.
  MinStageDecreased { id: ChunkId, stage: StageId },

  /// A dependency that held when the chunk left `stage` no longer holds.
  /// Consumed by the stage directly after `stage` to yank the chunk back.
  PreconditionFailed { id: ChunkId, stage: StageId },
}

// =============================================================================
// ChunkMap - the canonical state table
// =============================================================================

/// Canonical id -> [`ChunkStageData`] table, plus the queries stages use.
#[derive(Default)]
pub struct ChunkMap {
  chunks: HashMap<ChunkId, ChunkStageData>,
}

impl ChunkMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: ChunkId) -> Option<&ChunkStageData> {
    self.chunks.get(&id)
  }

  pub fn get_mut(&mut self, id: ChunkId) -> Option<&mut ChunkStageData> {
    self.chunks.get_mut(&id)
  }

  pub fn insert(&mut self, id: ChunkId, data: ChunkStageData) {
    self.chunks.insert(id, data);
  }

  pub fn remove(&mut self, id: ChunkId) -> Option<ChunkStageData> {
    self.chunks.remove(&id)
  }

  pub fn contains(&self, id: ChunkId) -> bool {
    self.chunks.contains_key(&id)
  }

  pub fn len(&self) -> usize {
    self.chunks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.chunks.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&ChunkId, &ChunkStageData)> {
    self.chunks.iter()
  }

  /// True when the chunk exists and its min-stage bound is strictly above
  /// `stage`. Unknown chunks never count as ready.
  pub fn min_stage_greater_than(&self, id: ChunkId, stage: StageId) -> bool {
    self.get(id).is_some_and(|d| d.min_stage > stage)
  }

  /// True when the chunk exists and its target is strictly above its
  /// current stage.
  pub fn target_greater_than_current(&self, id: ChunkId) -> bool {
    self.get(id).is_some_and(|d| d.target_stage > d.current_stage)
  }

  /// The terminate-here condition: the chunk should stop at `stage` because
  /// its target is at or below it. Unknown chunks terminate trivially.
  pub fn terminates_here(&self, id: ChunkId, stage: StageId) -> bool {
    self.get(id).is_none_or(|d| d.target_stage <= stage)
  }
}
