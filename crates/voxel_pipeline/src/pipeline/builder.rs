//! Ordered assembly of a stage list into a [`PipelineManager`].
//!
//! Stage ids are assigned from position, so the builder is the only place
//! that needs to know the ordering. A typical world pipeline:
//!
//! ```ignore
//! let pipeline = PipelineBuilder::new()
//!   .buffer_stage("gen_queue", priority_by_distance())
//!   .job_stage("terrain", 8, terrain_factory, commit_terrain)
//!   .wait_stage("structure_wait", Adjacency::Faces)
//!   .job_stage("structures", 8, structure_factory, commit_structures)
//!   .wait_stage("mesh_wait", Adjacency::FacesEdgesCorners)
//!   .buffer_stage("mesh_queue", priority_by_distance())
//!   .job_stage("mesh", 2, mesh_factory, commit_mesh)
//!   .pass_through_with_callback("collider", register_collider)
//!   .pass_through("complete")
//!   .build();
//! ```

use crate::chunk::Adjacency;
use crate::stage::buffer_stage::{PreconditionFn, PriorityFn};
use crate::stage::job_stage::{JobCommit, JobFactory};
use crate::stage::passthrough::PassCallback;
use crate::stage::wait_stage::WaitCallback;
use crate::stage::{
  JobStage, NeighborWaitStage, PassThroughStage, PriorityBufferStage, Stage,
};
use crate::state::StageId;

/// Builds the ordered stage list, assigning stage ids from position.
#[derive(Default)]
pub struct PipelineBuilder {
  stages: Vec<Box<dyn Stage>>,
}

impl PipelineBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  fn next_id(&self) -> StageId {
    self.stages.len() as StageId
  }

  /// Append a capacity-limited job stage.
  pub fn job_stage<T: Send + 'static>(
    mut self,
    name: &str,
    max_in_stage: usize,
    factory: JobFactory<T>,
    on_done: JobCommit<T>,
  ) -> Self {
    let id = self.next_id();
    self
      .stages
      .push(Box::new(JobStage::new(name, id, max_in_stage, factory, on_done)));
    self
  }

  /// Append a neighbor-wait stage.
  pub fn wait_stage(mut self, name: &str, adjacency: Adjacency) -> Self {
    let id = self.next_id();
    self
      .stages
      .push(Box::new(NeighborWaitStage::new(name, id, adjacency)));
    self
  }

  /// Append a neighbor-wait stage with a completion hook.
  pub fn wait_stage_with_callback(
    mut self,
    name: &str,
    adjacency: Adjacency,
    on_complete: WaitCallback,
  ) -> Self {
    let id = self.next_id();
    self.stages.push(Box::new(
      NeighborWaitStage::new(name, id, adjacency).with_callback(on_complete),
    ));
    self
  }

  /// Append an unbounded priority buffer.
  pub fn buffer_stage(mut self, name: &str, priority_fn: PriorityFn) -> Self {
    let id = self.next_id();
    self
      .stages
      .push(Box::new(PriorityBufferStage::new(name, id, priority_fn)));
    self
  }

  /// Append a priority buffer with a hand-off precondition re-check.
  pub fn buffer_stage_with_precondition(
    mut self,
    name: &str,
    priority_fn: PriorityFn,
    precondition: PreconditionFn,
  ) -> Self {
    let id = self.next_id();
    self.stages.push(Box::new(
      PriorityBufferStage::new(name, id, priority_fn).with_precondition(precondition),
    ));
    self
  }

  /// Append a zero-capacity pass-through position.
  ///
  /// A silent pass-through as the final stage is the usual terminal
  /// sentinel: a chunk whose target is the last stage is dropped on arrival
  /// there, which is exactly "fully complete".
  pub fn pass_through(mut self, name: &str) -> Self {
    let id = self.next_id();
    self.stages.push(Box::new(PassThroughStage::new(name, id)));
    self
  }

  /// Append a pass-through running a side effect for every chunk passing it.
  pub fn pass_through_with_callback(mut self, name: &str, on_pass: PassCallback) -> Self {
    let id = self.next_id();
    self.stages.push(Box::new(
      PassThroughStage::new(name, id).with_callback(on_pass),
    ));
    self
  }

  /// Finish: wire cross-stage subscriptions and hand the list to a manager.
  ///
  /// External entry (`set_target_stage` on an unknown chunk) is not
  /// throttled, so the first stage must admit unconditionally; put a buffer
  /// in front of any capacity-limited stage.
  pub fn build(self) -> super::PipelineManager {
    if let Some(first) = self.stages.first() {
      assert_eq!(
        first.entry_limit(),
        usize::MAX,
        "stage '{}' cannot be first: position 0 receives unthrottled external entry",
        first.name()
      );
    }
    super::PipelineManager::new(self.stages)
  }
}
