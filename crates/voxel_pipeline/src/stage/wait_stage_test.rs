use super::*;
use crate::stage::StageCtx;
use crate::state::{ChunkMap, ChunkStageData};

const STAGE: StageId = 2;

fn stage() -> NeighborWaitStage {
  NeighborWaitStage::new("mesh_wait", STAGE, Adjacency::Faces)
}

fn ctx<'a>(
  chunks: &'a mut ChunkMap,
  events: &'a mut Vec<PipelineEvent>,
) -> StageCtx<'a> {
  StageCtx {
    chunks,
    events,
    next: None,
  }
}

/// Insert `id` with a min-stage bound already past this wait stage.
fn certify(chunks: &mut ChunkMap, id: ChunkId) {
  chunks.insert(id, ChunkStageData::new(STAGE, STAGE));
}

#[test]
fn test_all_neighbors_certified_releases_immediately() {
  let mut wait = stage();
  let mut chunks = ChunkMap::new();
  let mut events = Vec::new();

  let a = ChunkId::new(0, 0, 0);
  chunks.insert(a, ChunkStageData::new(STAGE, 5));
  for n in a.neighbors(Adjacency::Faces) {
    certify(&mut chunks, n);
  }

  assert_eq!(wait.add(a, &mut ctx(&mut chunks, &mut events)), AddOutcome::Entered);
  wait.update(&mut ctx(&mut chunks, &mut events));
  assert_eq!(wait.moving_on(), &[a]);
  assert_eq!(wait.len(), 0);
}

#[test]
fn test_missing_neighbor_blocks() {
  let mut wait = stage();
  let mut chunks = ChunkMap::new();
  let mut events = Vec::new();

  let a = ChunkId::new(0, 0, 0);
  chunks.insert(a, ChunkStageData::new(STAGE, 5));
  // Five of six neighbors certified; +X missing entirely.
  for n in a.neighbors(Adjacency::Faces) {
    if n != ChunkId::new(1, 0, 0) {
      certify(&mut chunks, n);
    }
  }

  wait.add(a, &mut ctx(&mut chunks, &mut events));
  wait.update(&mut ctx(&mut chunks, &mut events));
  assert!(wait.moving_on().is_empty());
  assert_eq!(wait.len(), 1);
}

#[test]
fn test_neighbor_arrival_unblocks() {
  let mut wait = stage();
  let mut chunks = ChunkMap::new();
  let mut events = Vec::new();

  let a = ChunkId::new(0, 0, 0);
  let b = ChunkId::new(1, 0, 0);
  chunks.insert(a, ChunkStageData::new(STAGE, 5));
  for n in a.neighbors(Adjacency::Faces) {
    if n != b {
      certify(&mut chunks, n);
    }
  }

  wait.add(a, &mut ctx(&mut chunks, &mut events));
  wait.update(&mut ctx(&mut chunks, &mut events));
  assert!(wait.moving_on().is_empty());
  wait.clear_lists();

  // B arrives at this stage; even though it terminates here, its arrival
  // certifies it for A.
  chunks.insert(b, ChunkStageData::new(STAGE, STAGE));
  assert_eq!(
    wait.add(b, &mut ctx(&mut chunks, &mut events)),
    AddOutcome::Terminated
  );

  wait.update(&mut ctx(&mut chunks, &mut events));
  assert_eq!(wait.moving_on(), &[a]);
}

#[test]
fn test_ready_recheck_catches_flip_back() {
  let mut wait = stage();
  let mut chunks = ChunkMap::new();
  let mut events = Vec::new();

  let a = ChunkId::new(0, 0, 0);
  let b = ChunkId::new(0, 1, 0);
  chunks.insert(a, ChunkStageData::new(STAGE, 5));
  for n in a.neighbors(Adjacency::Faces) {
    certify(&mut chunks, n);
  }

  // Queued ready on add...
  wait.add(a, &mut ctx(&mut chunks, &mut events));

  // ...but B regresses before the tick runs.
  chunks.get_mut(b).unwrap().target_stage = 0;
  chunks.get_mut(b).unwrap().refresh_min_stage();
  wait.on_event(
    &PipelineEvent::MinStageDecreased { id: b, stage: 0 },
    &mut ctx(&mut chunks, &mut events),
  );

  wait.update(&mut ctx(&mut chunks, &mut events));
  assert!(wait.moving_on().is_empty(), "stale ready entry must not release");
  assert_eq!(wait.len(), 1);
}

#[test]
fn test_lost_neighbor_fails_passed_chunk() {
  let mut wait = stage();
  let mut chunks = ChunkMap::new();
  let mut events = Vec::new();

  let a = ChunkId::new(0, 0, 0);
  let b = ChunkId::new(0, 0, 1);
  chunks.insert(a, ChunkStageData::new(STAGE, 5));
  for n in a.neighbors(Adjacency::Faces) {
    certify(&mut chunks, n);
  }

  wait.add(a, &mut ctx(&mut chunks, &mut events));
  wait.update(&mut ctx(&mut chunks, &mut events));
  assert_eq!(wait.moving_on(), &[a]);
  wait.clear_lists();

  // A has passed; losing B must surface as a precondition failure so the
  // stage after us can yank A back.
  chunks.remove(b);
  wait.on_event(
    &PipelineEvent::ChunkRemoved { id: b },
    &mut ctx(&mut chunks, &mut events),
  );
  assert!(events.contains(&PipelineEvent::PreconditionFailed { id: a, stage: STAGE }));
}

#[test]
fn test_evicted_resident_terminates_in_place() {
  let mut wait = stage();
  let mut chunks = ChunkMap::new();
  let mut events = Vec::new();

  // A waits on a neighbor that will never arrive.
  let a = ChunkId::new(0, 0, 0);
  chunks.insert(a, ChunkStageData::new(STAGE, 5));
  wait.add(a, &mut ctx(&mut chunks, &mut events));

  // Eviction drops the target below this stage; the mask will never clear,
  // so the update sweep must terminate A instead.
  chunks.get_mut(a).unwrap().target_stage = crate::state::EVICT_TARGET;
  chunks.get_mut(a).unwrap().refresh_min_stage();

  wait.update(&mut ctx(&mut chunks, &mut events));
  assert_eq!(wait.finished_here(), &[a]);
  assert_eq!(wait.len(), 0);
}

#[test]
fn test_downgraded_chunk_leaves_passed_tracking() {
  let mut wait = stage();
  let mut chunks = ChunkMap::new();
  let mut events = Vec::new();

  let a = ChunkId::new(0, 0, 0);
  let b = ChunkId::new(0, 0, 1);
  chunks.insert(a, ChunkStageData::new(STAGE, 5));
  for n in a.neighbors(Adjacency::Faces) {
    certify(&mut chunks, n);
  }

  wait.add(a, &mut ctx(&mut chunks, &mut events));
  wait.update(&mut ctx(&mut chunks, &mut events));
  assert_eq!(wait.moving_on(), &[a]);
  wait.clear_lists();

  // A's own target drops below this stage: it is headed back upstream and
  // must stop being policed as a downstream dependent.
  chunks.get_mut(a).unwrap().target_stage = 0;
  chunks.get_mut(a).unwrap().refresh_min_stage();
  wait.on_event(
    &PipelineEvent::MinStageDecreased { id: a, stage: 0 },
    &mut ctx(&mut chunks, &mut events),
  );
  events.clear();

  // Losing B afterwards must not report a failure for A.
  chunks.remove(b);
  wait.on_event(
    &PipelineEvent::ChunkRemoved { id: b },
    &mut ctx(&mut chunks, &mut events),
  );
  assert!(!events
    .iter()
    .any(|e| matches!(e, PipelineEvent::PreconditionFailed { id, .. } if *id == a)));
}

#[test]
fn test_removed_resident_is_forgotten() {
  let mut wait = stage();
  let mut chunks = ChunkMap::new();
  let mut events = Vec::new();

  let a = ChunkId::new(0, 0, 0);
  chunks.insert(a, ChunkStageData::new(STAGE, 5));

  wait.add(a, &mut ctx(&mut chunks, &mut events));
  assert_eq!(wait.len(), 1);

  chunks.remove(a);
  wait.on_event(
    &PipelineEvent::ChunkRemoved { id: a },
    &mut ctx(&mut chunks, &mut events),
  );
  assert_eq!(wait.len(), 0);
}

#[test]
fn test_reentry_recomputes_mask() {
  let mut wait = stage();
  let mut chunks = ChunkMap::new();
  let mut events = Vec::new();

  let a = ChunkId::new(0, 0, 0);
  let b = ChunkId::new(1, 0, 0);
  chunks.insert(a, ChunkStageData::new(STAGE, 5));
  for n in a.neighbors(Adjacency::Faces) {
    certify(&mut chunks, n);
  }

  wait.add(a, &mut ctx(&mut chunks, &mut events));
  wait.update(&mut ctx(&mut chunks, &mut events));
  assert_eq!(wait.moving_on(), &[a]);
  wait.clear_lists();

  // B leaves the pipeline, then A is pushed back in from downstream.
  chunks.remove(b);
  wait.on_event(
    &PipelineEvent::ChunkRemoved { id: b },
    &mut ctx(&mut chunks, &mut events),
  );
  assert_eq!(wait.add(a, &mut ctx(&mut chunks, &mut events)), AddOutcome::Entered);

  wait.update(&mut ctx(&mut chunks, &mut events));
  assert!(wait.moving_on().is_empty(), "fresh mask must reflect the lost neighbor");
}
