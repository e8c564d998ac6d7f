//! Test utilities for pipeline tests.
//!
//! Provides a canonical world pipeline with mock generators and a shared
//! chunk record store, so behavior tests exercise the same stage shapes
//! production uses: queue → generate → wait → queue → mesh → collide.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::chunk::{Adjacency, ChunkId};
use crate::job::Job;
use crate::pipeline::{PipelineBuilder, PipelineManager};
use crate::state::StageId;

/// Shared mock chunk record store: per-chunk log of committed results.
pub type Store = Rc<RefCell<HashMap<ChunkId, Vec<&'static str>>>>;

pub fn new_store() -> Store {
  Rc::new(RefCell::new(HashMap::new()))
}

pub fn record(store: &Store, id: ChunkId, what: &'static str) {
  store.borrow_mut().entry(id).or_default().push(what);
}

/// Committed results for one chunk, in commit order.
pub fn log_for(store: &Store, id: ChunkId) -> Vec<&'static str> {
  store.borrow().get(&id).cloned().unwrap_or_default()
}

/// Stage indices of [`world_pipeline`].
pub const GEN_QUEUE: StageId = 0;
pub const TERRAIN: StageId = 1;
pub const MESH_WAIT: StageId = 2;
pub const MESH_QUEUE: StageId = 3;
pub const MESH: StageId = 4;
pub const COLLIDER: StageId = 5;
pub const COMPLETE: StageId = 6;
pub const FULL: StageId = COMPLETE;

/// Manhattan distance to origin, negated: closer chunks release first.
fn priority(id: ChunkId) -> i64 {
  -i64::from(id.0.x.abs() + id.0.y.abs() + id.0.z.abs())
}

/// The canonical six-stage test pipeline with synchronous jobs.
///
/// `mesh_slots` caps the mesh job stage; 0 parks everything in the mesh
/// queue, which regression tests rely on.
pub fn world_pipeline(store: Store, mesh_slots: usize) -> PipelineManager {
  let terrain_store = store.clone();
  let mesh_store = store.clone();
  let collider_store = store.clone();

  PipelineBuilder::new()
    .buffer_stage("gen_queue", Box::new(priority))
    .job_stage(
      "terrain",
      8,
      Box::new(|id: ChunkId| Job::ready(id)),
      Box::new(move |id, _| record(&terrain_store, id, "terrain")),
    )
    .wait_stage("mesh_wait", Adjacency::Faces)
    .buffer_stage_with_precondition(
      "mesh_queue",
      Box::new(priority),
      // Same condition the wait stage enforced, re-validated at hand-off.
      Box::new(|id, chunks| {
        id.neighbors(Adjacency::Faces)
          .iter()
          .all(|n| chunks.min_stage_greater_than(*n, MESH_WAIT - 1))
      }),
    )
    .job_stage(
      "mesh",
      mesh_slots,
      Box::new(|id: ChunkId| Job::ready(id)),
      Box::new(move |id, _| record(&mesh_store, id, "mesh")),
    )
    .pass_through_with_callback(
      "collider",
      Box::new(move |id| record(&collider_store, id, "collider")),
    )
    .pass_through("complete")
    .build()
}

/// Run ticks until the pipeline settles or `max_ticks` elapse. Returns the
/// number of ticks taken.
pub fn settle(pipeline: &mut PipelineManager, max_ticks: usize) -> usize {
  for tick in 0..max_ticks {
    if pipeline.all_chunks_in_target_state() {
      return tick;
    }
    pipeline.update();
  }
  panic!("pipeline did not settle within {max_ticks} ticks");
}
