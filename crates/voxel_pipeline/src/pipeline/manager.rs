//! The pipeline manager: owns the ordered stage list, the canonical chunk
//! state table, and the once-per-frame update tick.
//!
//! # Tick order
//!
//! 1. Pump queued events through every stage (until quiescent).
//! 2. `update()` every stage in ascending order. A stage sees the stage
//!    after it (read-only) so it can respect downstream admission.
//! 3. Route: ids on `moving_on` lists enter the next stage, ids on
//!    `going_backward` lists re-enter the previous stage, ids on
//!    `finished_here` lists settle in place.
//! 4. Walk settled chunks: step eviction drains down one stage per tick and
//!    re-enter upgraded chunks, capacity permitting.
//! 5. `clear_lists()` on every stage.
//!
//! Because stages update in pipeline order and routing moves an id at most
//! one stage, `current_stage` changes by at most ±1 per tick (pass-through
//! positions excepted; they are zero-capacity by definition).

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::chunk::ChunkId;
use crate::stage::{AddOutcome, Stage, StageCtx};
use crate::state::{
  ChunkMap, ChunkStageData, PipelineEvent, StageId, TargetUpdateMode,
};

/// Single-threaded chunk pipeline scheduler.
///
/// All mutation happens on the thread that calls [`update`](Self::update);
/// jobs run elsewhere but are only ever polled from here.
pub struct PipelineManager {
  stages: Vec<Box<dyn Stage>>,
  chunks: ChunkMap,
  /// Chunks holding a state record but resident in no stage (reached their
  /// target, or waiting to drain/re-enter).
  settled: HashSet<ChunkId>,
  events: Vec<PipelineEvent>,
}

impl PipelineManager {
  /// Build from an ordered stage list. Stage ids must match positions;
  /// use [`PipelineBuilder`](crate::pipeline::PipelineBuilder) rather than
  /// assembling the list by hand.
  pub(crate) fn new(mut stages: Vec<Box<dyn Stage>>) -> Self {
    assert!(!stages.is_empty(), "pipeline needs at least one stage");
    for (idx, stage) in stages.iter().enumerate() {
      assert_eq!(
        stage.stage_id(),
        idx as StageId,
        "stage '{}' id does not match its position",
        stage.name()
      );
    }
    for stage in &mut stages {
      stage.initialise();
    }
    Self {
      stages,
      chunks: ChunkMap::new(),
      settled: HashSet::new(),
      events: Vec::new(),
    }
  }

  // ===========================================================================
  // Queries
  // ===========================================================================

  pub fn stage_count(&self) -> usize {
    self.stages.len()
  }

  /// Index of the last ("fully complete") stage.
  pub fn last_stage(&self) -> StageId {
    self.stages.len() as StageId - 1
  }

  pub fn stage(&self, idx: StageId) -> &dyn Stage {
    self.stages[idx as usize].as_ref()
  }

  pub fn chunk_state(&self, id: ChunkId) -> Option<&ChunkStageData> {
    self.chunks.get(id)
  }

  /// The one stage whose residency set holds `id`, if any.
  pub fn resident_stage(&self, id: ChunkId) -> Option<StageId> {
    self
      .stages
      .iter()
      .find(|s| s.contains(id))
      .map(|s| s.stage_id())
  }

  pub fn chunk_min_stage_greater_than(&self, id: ChunkId, stage: StageId) -> bool {
    self.chunks.min_stage_greater_than(id, stage)
  }

  pub fn target_stage_greater_than_current(&self, id: ChunkId) -> bool {
    self.chunks.target_greater_than_current(id)
  }

  /// True when every known chunk sits exactly at its target with no
  /// residency, no queued events, and no in-flight work.
  pub fn all_chunks_in_target_state(&self) -> bool {
    self.events.is_empty()
      && self.stages.iter().all(|s| s.is_empty())
      && self
        .chunks
        .iter()
        .all(|(_, d)| d.current_stage == d.target_stage)
  }

  /// Alias used by play-area callers polling for convergence.
  pub fn is_settled(&self) -> bool {
    self.all_chunks_in_target_state()
  }

  // ===========================================================================
  // External mutation
  // ===========================================================================

  /// Set the target stage for a chunk, entering it into the pipeline at
  /// stage 0 if it is unknown.
  ///
  /// Targets above the last stage are clamped to it. For a settled chunk an
  /// upgrade takes its first step immediately (capacity permitting) rather
  /// than waiting for the next tick.
  pub fn set_target_stage(&mut self, id: ChunkId, target: StageId, mode: TargetUpdateMode) {
    let target = target.min(self.last_stage());

    if let Some(data) = self.chunks.get_mut(id) {
      let apply = match mode {
        TargetUpdateMode::Set => true,
        TargetUpdateMode::UpgradeOnly => target > data.target_stage,
        TargetUpdateMode::DowngradeOnly => target < data.target_stage,
      };
      if !apply || target == data.target_stage {
        return;
      }

      trace!(chunk = %id, old = data.target_stage, new = target, "target changed");
      data.target_stage = target;
      if data.refresh_min_stage() {
        let stage = data.min_stage;
        self.events.push(PipelineEvent::MinStageDecreased { id, stage });
      }

      // Fast-path upgrade for idle chunks: latency-sensitive requests must
      // not be starved behind the tick cadence.
      if self.settled.contains(&id) && self.chunks.target_greater_than_current(id) {
        self.try_advance_settled(id);
      }
      return;
    }

    // Unknown chunk: a non-evicting target enters the pipeline at stage 0.
    if target < 0 {
      return;
    }
    self.chunks.insert(id, ChunkStageData::new(0, target));
    self
      .events
      .push(PipelineEvent::ChunkAdded { id, stage: 0 });
    debug!(chunk = %id, target, "chunk entered pipeline");
    self.add_to_stage(0, id);
  }

  /// Request removal of a chunk from the pipeline.
  ///
  /// Returns `true` if the chunk is gone or idle (the eviction drain will
  /// remove it over the next ticks), `false` if it is still mid-stage; the
  /// caller retries later.
  pub fn try_deactivate(&mut self, id: ChunkId) -> bool {
    if !self.chunks.contains(id) {
      return true;
    }
    self.set_target_stage(id, crate::state::EVICT_TARGET, TargetUpdateMode::Set);
    self.settled.contains(&id)
  }

  /// Tear the pipeline down, synchronously draining all in-flight jobs.
  pub fn dispose(&mut self) {
    for stage in &mut self.stages {
      stage.dispose();
    }
    self.settled.clear();
    self.events.clear();
    self.chunks = ChunkMap::new();
  }

  // ===========================================================================
  // The tick
  // ===========================================================================

  /// One pipeline tick. Call once per frame from the owning thread.
  pub fn update(&mut self) {
    self.pump_events();

    // Stage updates, ascending, each seeing the stage after it.
    for i in 0..self.stages.len() {
      let Self {
        stages,
        chunks,
        events,
        ..
      } = self;
      let (left, right) = stages.split_at_mut(i + 1);
      let next = right.first().map(|b| b.as_ref() as &dyn Stage);
      left[i].update(&mut StageCtx {
        chunks,
        events,
        next,
      });
    }

    // Routing, ascending: forward moves reach a stage whose lists were
    // already drained, so each id moves at most one stage per tick.
    for i in 0..self.stages.len() {
      let finished: Vec<ChunkId> = self.stages[i].finished_here().to_vec();
      let backward: Vec<ChunkId> = self.stages[i].going_backward().to_vec();
      let forward: Vec<ChunkId> = self.stages[i].moving_on().to_vec();

      for id in finished {
        trace!(chunk = %id, stage = i, "finished in place");
        self.settle(id);
      }
      for id in backward {
        self.regress_from(i as StageId, id);
      }
      for id in forward {
        self.advance_from(i as StageId, id);
      }
    }

    self.drain_settled();

    for stage in &mut self.stages {
      stage.clear_lists();
    }
  }

  /// Deliver queued events to every stage, looping until no stage produces
  /// follow-up events.
  fn pump_events(&mut self) {
    while !self.events.is_empty() {
      let batch = std::mem::take(&mut self.events);
      for event in &batch {
        trace!(?event, "pipeline event");
        let Self {
          stages,
          chunks,
          events,
          ..
        } = self;
        for stage in stages.iter_mut() {
          stage.on_event(event, &mut StageCtx {
            chunks,
            events,
            next: None,
          });
        }
      }
    }
  }

  // ===========================================================================
  // Movement helpers
  // ===========================================================================

  fn settle(&mut self, id: ChunkId) {
    self.settled.insert(id);
  }

  /// Hand `id` to the stage at `idx`, chaining through pass-through
  /// forwards. The caller has already set `current_stage = idx`.
  fn add_to_stage(&mut self, idx: StageId, id: ChunkId) {
    let last = self.last_stage();
    let mut idx = idx;
    loop {
      if idx > last {
        // Forwarded off the end of the list: fully complete.
        self.settle(id);
        return;
      }
      let Self {
        stages,
        chunks,
        events,
        ..
      } = self;
      let outcome = stages[idx as usize].add(id, &mut StageCtx {
        chunks,
        events,
        next: None,
      });
      match outcome {
        AddOutcome::Entered => {
          self.settled.remove(&id);
          return;
        }
        AddOutcome::Terminated => {
          self.settle(id);
          return;
        }
        AddOutcome::Forwarded => {
          idx += 1;
          if let Some(data) = self.chunks.get_mut(id) {
            data.current_stage = data.current_stage.max(idx.min(last));
            data.refresh_min_stage();
          }
        }
      }
    }
  }

  fn advance_from(&mut self, from: StageId, id: ChunkId) {
    let to = from + 1;
    if to > self.last_stage() {
      // Completed the final stage.
      self.settle(id);
      return;
    }
    if let Some(data) = self.chunks.get_mut(id) {
      debug_assert_eq!(data.current_stage, from, "advance from wrong stage");
      data.current_stage = to;
      data.refresh_min_stage();
    }
    trace!(chunk = %id, from, to, "advance");
    self.add_to_stage(to, id);
  }

  fn regress_from(&mut self, from: StageId, id: ChunkId) {
    assert!(from > 0, "cannot regress from stage 0");
    let to = from - 1;
    if let Some(data) = self.chunks.get_mut(id) {
      data.current_stage = to;
      if data.refresh_min_stage() {
        let stage = data.min_stage;
        self.events.push(PipelineEvent::MinStageDecreased { id, stage });
      }
    }
    trace!(chunk = %id, from, to, "regress");
    self.add_to_stage(to, id);
  }

  /// Step settled chunks toward their targets: evictions drain one stage
  /// per tick; upgrades re-enter when the next stage has room.
  fn drain_settled(&mut self) {
    let ids: Vec<ChunkId> = self.settled.iter().copied().collect();
    for id in ids {
      let Some(data) = self.chunks.get(id) else {
        self.settled.remove(&id);
        continue;
      };
      if data.target_stage < data.current_stage {
        let data = self.chunks.get_mut(id).expect("checked above");
        if data.current_stage == 0 {
          // Target below stage 0: the chunk leaves the pipeline.
          self.chunks.remove(id);
          self.settled.remove(&id);
          self.events.push(PipelineEvent::ChunkRemoved { id });
          debug!(chunk = %id, "chunk evicted");
        } else {
          data.current_stage -= 1;
          data.refresh_min_stage();
          trace!(chunk = %id, to = data.current_stage, "drain step");
        }
      } else if data.target_stage > data.current_stage {
        self.try_advance_settled(id);
      }
    }
  }

  /// Move a settled chunk one stage forward if the next stage admits it.
  fn try_advance_settled(&mut self, id: ChunkId) {
    let Some(data) = self.chunks.get(id) else {
      return;
    };
    let to = data.current_stage + 1;
    if to > self.last_stage() {
      return;
    }
    {
      let next = self.stages[to as usize].as_ref();
      if next.entry_limit() == 0 || !next.free_for(id) {
        return;
      }
    }
    self.settled.remove(&id);
    self.advance_from(to - 1, id);
  }
}

impl Drop for PipelineManager {
  fn drop(&mut self) {
    self.dispose();
  }
}
