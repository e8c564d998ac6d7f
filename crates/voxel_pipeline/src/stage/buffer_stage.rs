//! Unbounded priority buffer decoupling "ready to advance" from "next stage
//! has room".
//!
//! Bursty completions (a whole ring of terrain jobs finishing in one tick)
//! pile up here and drain into the next stage's fixed capacity in priority
//! order, closest-to-observer first.

use std::collections::HashMap;

use tracing::trace;

use super::{AddOutcome, Stage, StageCtx, TickLists};
use crate::chunk::ChunkId;
use crate::state::{ChunkMap, PipelineEvent, StageId};

/// Caller-supplied priority; higher values release sooner.
pub type PriorityFn = Box<dyn Fn(ChunkId) -> i64>;

/// Caller-supplied admission re-check run immediately before hand-off.
pub type PreconditionFn = Box<dyn Fn(ChunkId, &ChunkMap) -> bool>;

/// Stage holding an unbounded id -> priority queue.
///
/// Priorities are recomputed on re-add, so a chunk bounced back by a target
/// change re-enters the queue at its current urgency rather than its stale
/// one.
pub struct PriorityBufferStage {
  name: String,
  stage_id: StageId,
  queue: HashMap<ChunkId, i64>,
  priority_fn: PriorityFn,
  precondition: Option<PreconditionFn>,
  lists: TickLists,
}

impl PriorityBufferStage {
  pub fn new(name: impl Into<String>, stage_id: StageId, priority_fn: PriorityFn) -> Self {
    Self {
      name: name.into(),
      stage_id,
      queue: HashMap::new(),
      priority_fn,
      precondition: None,
      lists: TickLists::default(),
    }
  }

  /// Install a hand-off re-check. Run once more for every id right before
  /// it is released, guarding the gap between enqueue and dequeue.
  pub fn with_precondition(mut self, precondition: PreconditionFn) -> Self {
    self.precondition = Some(precondition);
    self
  }

  /// Residents sorted by descending priority, ties broken by coordinate for
  /// deterministic release order.
  fn drain_order(&self) -> Vec<ChunkId> {
    let mut order: Vec<(i64, ChunkId)> =
      self.queue.iter().map(|(id, prio)| (*prio, *id)).collect();
    order.sort_by_key(|(prio, id)| (-*prio, id.0.x, id.0.y, id.0.z));
    order.into_iter().map(|(_, id)| id).collect()
  }
}

impl Stage for PriorityBufferStage {
  fn name(&self) -> &str {
    &self.name
  }

  fn stage_id(&self) -> StageId {
    self.stage_id
  }

  fn len(&self) -> usize {
    self.queue.len()
  }

  fn contains(&self, id: ChunkId) -> bool {
    self.queue.contains_key(&id)
  }

  fn add(&mut self, id: ChunkId, ctx: &mut StageCtx) -> AddOutcome {
    if ctx.chunks.terminates_here(id, self.stage_id) {
      self.queue.remove(&id);
      return AddOutcome::Terminated;
    }
    // Re-add of a resident id refreshes its priority rather than asserting;
    // a transient target change may legitimately route the same id here
    // again.
    self.queue.insert(id, (self.priority_fn)(id));
    AddOutcome::Entered
  }

  fn update(&mut self, ctx: &mut StageCtx) {
    self.lists.begin_update(&self.name);

    // Targets that regressed while queued terminate silently, regardless of
    // downstream room: an evicted chunk must leave the queue even when the
    // next stage never opens up.
    {
      let stage_id = self.stage_id;
      let Self { queue, lists, .. } = self;
      queue.retain(|id, _| {
        if ctx.chunks.terminates_here(*id, stage_id) {
          lists.finished.push(*id);
          false
        } else {
          true
        }
      });
    }

    let Some(next) = ctx.next else {
      return;
    };
    let mut room = next.entry_limit();
    if room == 0 || self.queue.is_empty() {
      return;
    }

    for id in self.drain_order() {
      if room == 0 {
        break;
      }
      if !next.free_for(id) {
        continue;
      }
      // Final staleness guard before hand-off. Deliberately in addition to
      // any check the upstream stage did when it released the id.
      if let Some(pre) = &self.precondition {
        if !pre(id, ctx.chunks) {
          continue;
        }
      }

      self.queue.remove(&id);
      self.lists.moving_on.push(id);
      room -= 1;
    }
  }

  fn on_event(&mut self, event: &PipelineEvent, _ctx: &mut StageCtx) {
    match *event {
      // The stage directly before us reports a broken dependency: yank the
      // id out of the queue instead of letting it wait its priority turn.
      PipelineEvent::PreconditionFailed { id, stage } if stage == self.stage_id - 1 => {
        if self.queue.remove(&id).is_some() {
          trace!(stage = %self.name, chunk = %id, "yanked on upstream precondition failure");
          self.lists.going_backward.push(id);
        }
      }
      PipelineEvent::ChunkRemoved { id } => {
        self.queue.remove(&id);
      }
      _ => {}
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
    self.queue.clear();
  }
}

#[cfg(test)]
#[path = "buffer_stage_test.rs"]
mod buffer_stage_test;
