//! Capacity-limited stage that owns one [`Job`] per resident chunk.

use std::collections::HashMap;

use tracing::trace;
use web_time::Instant;

use super::{AddOutcome, Stage, StageCtx, TickLists};
use crate::chunk::ChunkId;
use crate::job::Job;
use crate::state::{PipelineEvent, StageId};

/// Builds and starts the job for a chunk entering the stage.
pub type JobFactory<T> = Box<dyn FnMut(ChunkId) -> Job<T>>;

/// Commits a finished job's result to the chunk record store.
pub type JobCommit<T> = Box<dyn FnMut(ChunkId, T)>;

/// A stage whose work is an asynchronous job per chunk, with a hard cap on
/// how many run at once.
///
/// Entry is expected to be throttled by a [`PriorityBufferStage`]
/// (`super::PriorityBufferStage`) directly before it; exceeding
/// `max_in_stage` is a contract violation, not backpressure.
pub struct JobStage<T> {
  name: String,
  stage_id: StageId,
  max_in_stage: usize,
  jobs: HashMap<ChunkId, (Job<T>, Instant)>,
  factory: JobFactory<T>,
  on_done: JobCommit<T>,
  lists: TickLists,
}

impl<T: Send + 'static> JobStage<T> {
  pub fn new(
    name: impl Into<String>,
    stage_id: StageId,
    max_in_stage: usize,
    factory: JobFactory<T>,
    on_done: JobCommit<T>,
  ) -> Self {
    Self {
      name: name.into(),
      stage_id,
      max_in_stage,
      jobs: HashMap::new(),
      factory,
      on_done,
      lists: TickLists::default(),
    }
  }

  pub fn max_in_stage(&self) -> usize {
    self.max_in_stage
  }
}

impl<T: Send + 'static> Stage for JobStage<T> {
  fn name(&self) -> &str {
    &self.name
  }

  fn stage_id(&self) -> StageId {
    self.stage_id
  }

  fn len(&self) -> usize {
    self.jobs.len()
  }

  fn entry_limit(&self) -> usize {
    self.max_in_stage - self.jobs.len()
  }

  fn contains(&self, id: ChunkId) -> bool {
    self.jobs.contains_key(&id)
  }

  fn add(&mut self, id: ChunkId, ctx: &mut StageCtx) -> AddOutcome {
    assert!(
      !self.jobs.contains_key(&id),
      "duplicate add of {id} to job stage '{}'",
      self.name
    );
    if ctx.chunks.terminates_here(id, self.stage_id) {
      return AddOutcome::Terminated;
    }
    assert!(
      self.jobs.len() < self.max_in_stage,
      "job stage '{}' over capacity ({})",
      self.name,
      self.max_in_stage
    );

    let job = (self.factory)(id);
    self.jobs.insert(id, (job, Instant::now()));
    AddOutcome::Entered
  }

  fn update(&mut self, ctx: &mut StageCtx) {
    self.lists.begin_update(&self.name);

    let mut done: Vec<ChunkId> = Vec::new();
    for (id, (job, _)) in self.jobs.iter_mut() {
      if job.done() {
        done.push(*id);
      }
    }

    // Room accounting: everything released this tick shares the next
    // stage's remaining capacity as measured now.
    let mut room = ctx.next.map_or(usize::MAX, |n| n.entry_limit());

    for id in done {
      if ctx.chunks.terminates_here(id, self.stage_id) {
        // Target regressed while the job ran: the result is wasted, not
        // wrong. Discard it and settle in place.
        let (_, started) = self.jobs.remove(&id).expect("done id vanished");
        trace!(
          stage = %self.name,
          chunk = %id,
          elapsed_us = started.elapsed().as_micros() as u64,
          "job result discarded, target regressed"
        );
        self.lists.finished.push(id);
        continue;
      }

      let next_has_room =
        room > 0 && ctx.next.is_none_or(|n| n.free_for(id));
      if !next_has_room {
        // Done but blocked; the cached result is applied once room opens.
        continue;
      }

      let (mut job, started) = self.jobs.remove(&id).expect("done id vanished");
      trace!(
        stage = %self.name,
        chunk = %id,
        elapsed_us = started.elapsed().as_micros() as u64,
        "job complete"
      );
      (self.on_done)(id, job.take_result());
      self.lists.moving_on.push(id);
      room = room.saturating_sub(1);
    }
  }

  fn on_event(&mut self, _event: &PipelineEvent, _ctx: &mut StageCtx) {}

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
    // Synchronously drain every in-flight job so no background work
    // outlives the pipeline. Results are dropped: teardown has no store to
    // commit into.
    for (id, (mut job, _)) in self.jobs.drain() {
      job.force_complete();
      let _ = job.take_result();
      trace!(stage = %self.name, chunk = %id, "job drained on dispose");
    }
  }
}

#[cfg(test)]
#[path = "job_stage_test.rs"]
mod job_stage_test;
