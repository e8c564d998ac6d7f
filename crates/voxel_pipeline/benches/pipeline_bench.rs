//! Scheduler overhead benchmarks.
//!
//! Jobs complete instantly, so these measure the pipeline bookkeeping
//! itself rather than generation work:
//! - **settle**: drive an n³ region from empty to fully complete
//! - **steady_state**: tick cost once everything sits at its target
//! - **churn**: evict and re-request a region that already converged
//! - **adjacency**: wait-stage mask maintenance, faces vs. full 26

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use voxel_pipeline::{
  Adjacency, ChunkId, Job, PipelineBuilder, PipelineManager, TargetUpdateMode,
};

// =============================================================================
// Fixtures
// =============================================================================

fn priority(id: ChunkId) -> i64 {
  -i64::from(id.0.x.abs() + id.0.y.abs() + id.0.z.abs())
}

/// Production-shaped pipeline with synchronous jobs and no-op commits:
/// queue → generate → wait → queue → mesh → complete.
fn world_pipeline(adjacency: Adjacency) -> PipelineManager {
  PipelineBuilder::new()
    .buffer_stage("gen_queue", Box::new(priority))
    .job_stage(
      "generate",
      64,
      Box::new(|id: ChunkId| Job::ready(id)),
      Box::new(|_, _| {}),
    )
    .wait_stage("mesh_wait", adjacency)
    .buffer_stage("mesh_queue", Box::new(priority))
    .job_stage(
      "mesh",
      64,
      Box::new(|id: ChunkId| Job::ready(id)),
      Box::new(|_, _| {}),
    )
    .pass_through("complete")
    .build()
}

/// Chunk ids of an n³ cube centered on the origin.
fn region(n: i32) -> Vec<ChunkId> {
  let half = n / 2;
  let mut ids = Vec::with_capacity((n * n * n) as usize);
  for x in -half..n - half {
    for y in -half..n - half {
      for z in -half..n - half {
        ids.push(ChunkId::new(x, y, z));
      }
    }
  }
  ids
}

/// Target the interior at full and the boundary at the wait stage, the way
/// a play area requests a loaded core with a generated rim.
fn request_region(pipeline: &mut PipelineManager, ids: &[ChunkId], n: i32) {
  let half = n / 2;
  // The outermost shell only reaches the wait stage, so every interior
  // chunk finds all of its dependencies inside the region.
  let interior = |v: i32| v > -half && v < n - half - 1;
  let full = pipeline.last_stage();
  for id in ids {
    let target = if interior(id.0.x) && interior(id.0.y) && interior(id.0.z) {
      full
    } else {
      2
    };
    pipeline.set_target_stage(*id, target, TargetUpdateMode::Set);
  }
}

fn settle(pipeline: &mut PipelineManager) -> usize {
  let mut ticks = 0;
  while !pipeline.all_chunks_in_target_state() {
    pipeline.update();
    ticks += 1;
    assert!(ticks < 10_000, "pipeline failed to converge");
  }
  ticks
}

// =============================================================================
// Benchmarks
// =============================================================================

/// Full convergence of a fresh region, bookkeeping only.
fn bench_settle(c: &mut Criterion) {
  let mut group = c.benchmark_group("pipeline/settle");

  for n in [4, 8, 12] {
    let ids = region(n);
    group.bench_with_input(BenchmarkId::new("faces", n), &n, |b, &n| {
      b.iter(|| {
        let mut pipeline = world_pipeline(Adjacency::Faces);
        request_region(&mut pipeline, &ids, n);
        black_box(settle(&mut pipeline))
      })
    });
  }

  group.finish();
}

/// Tick cost when every chunk already sits at its target.
fn bench_steady_state(c: &mut Criterion) {
  let mut group = c.benchmark_group("pipeline/steady_state");

  for n in [8, 16] {
    let ids = region(n);
    let mut pipeline = world_pipeline(Adjacency::Faces);
    request_region(&mut pipeline, &ids, n);
    settle(&mut pipeline);

    group.bench_with_input(BenchmarkId::new("tick", n), &n, |b, _| {
      b.iter(|| {
        pipeline.update();
        black_box(pipeline.is_settled())
      })
    });
  }

  group.finish();
}

/// Evict a converged region and immediately request it again. Exercises
/// the drain path, dependency-break events, and re-entry.
fn bench_churn(c: &mut Criterion) {
  let mut group = c.benchmark_group("pipeline/churn");

  for n in [4, 8] {
    let ids = region(n);
    group.bench_with_input(BenchmarkId::new("evict_and_reload", n), &n, |b, &n| {
      b.iter(|| {
        let mut pipeline = world_pipeline(Adjacency::Faces);
        request_region(&mut pipeline, &ids, n);
        settle(&mut pipeline);

        for id in &ids {
          pipeline.try_deactivate(*id);
        }
        settle(&mut pipeline);

        request_region(&mut pipeline, &ids, n);
        black_box(settle(&mut pipeline))
      })
    });
  }

  group.finish();
}

/// Wait-stage mask cost for face-only vs. full 26-neighbor dependencies.
fn bench_adjacency(c: &mut Criterion) {
  let mut group = c.benchmark_group("pipeline/adjacency");
  let n = 8;
  let ids = region(n);

  group.bench_function("faces", |b| {
    b.iter(|| {
      let mut pipeline = world_pipeline(Adjacency::Faces);
      request_region(&mut pipeline, &ids, n);
      black_box(settle(&mut pipeline))
    })
  });

  group.bench_function("faces_edges_corners", |b| {
    b.iter(|| {
      let mut pipeline = world_pipeline(Adjacency::FacesEdgesCorners);
      request_region(&mut pipeline, &ids, n);
      black_box(settle(&mut pipeline))
    })
  });

  group.finish();
}

criterion_group!(
  pipeline,
  bench_settle,
  bench_steady_state,
  bench_churn,
  bench_adjacency,
);

criterion_main!(pipeline);
