//! Chunk identity and neighbor topology.
//!
//! A chunk is a fixed-size cubic region of the voxel world, identified by its
//! integer grid coordinate. The pipeline never looks inside a chunk; it only
//! schedules work keyed by `ChunkId` and asks topology questions ("who are
//! your neighbors?") through [`Adjacency`].

use glam::IVec3;
use smallvec::SmallVec;

/// Unique identity of a spatial cell. Hash key everywhere.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ChunkId(pub IVec3);

impl ChunkId {
  pub const fn new(x: i32, y: i32, z: i32) -> Self {
    Self(IVec3::new(x, y, z))
  }

  /// All neighbor ids under the given adjacency, in direction-index order.
  pub fn neighbors(&self, adjacency: Adjacency) -> SmallVec<[ChunkId; 26]> {
    adjacency
      .offsets()
      .iter()
      .map(|off| ChunkId(self.0 + *off))
      .collect()
  }
}

impl std::fmt::Display for ChunkId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "({}, {}, {})", self.0.x, self.0.y, self.0.z)
  }
}

// =============================================================================
// Adjacency - neighbor direction sets
// =============================================================================

/// Face-only neighbor offsets (6-way).
pub const FACE_OFFSETS: [IVec3; 6] = [
  IVec3::new(-1, 0, 0),
  IVec3::new(1, 0, 0),
  IVec3::new(0, -1, 0),
  IVec3::new(0, 1, 0),
  IVec3::new(0, 0, -1),
  IVec3::new(0, 0, 1),
];

/// Face + edge + corner neighbor offsets (26-way).
///
/// Every non-zero offset in the 3x3x3 cube around the origin, in scanline
/// order. Direction index = position in this table.
pub const FULL_OFFSETS: [IVec3; 26] = [
  IVec3::new(-1, -1, -1),
  IVec3::new(-1, -1, 0),
  IVec3::new(-1, -1, 1),
  IVec3::new(-1, 0, -1),
  IVec3::new(-1, 0, 0),
  IVec3::new(-1, 0, 1),
  IVec3::new(-1, 1, -1),
  IVec3::new(-1, 1, 0),
  IVec3::new(-1, 1, 1),
  IVec3::new(0, -1, -1),
  IVec3::new(0, -1, 0),
  IVec3::new(0, -1, 1),
  IVec3::new(0, 0, -1),
  IVec3::new(0, 0, 1),
  IVec3::new(0, 1, -1),
  IVec3::new(0, 1, 0),
  IVec3::new(0, 1, 1),
  IVec3::new(1, -1, -1),
  IVec3::new(1, -1, 0),
  IVec3::new(1, -1, 1),
  IVec3::new(1, 0, -1),
  IVec3::new(1, 0, 0),
  IVec3::new(1, 0, 1),
  IVec3::new(1, 1, -1),
  IVec3::new(1, 1, 0),
  IVec3::new(1, 1, 1),
];

/// Which neighbors a wait stage considers.
///
/// `Faces` is enough for stages whose work reads only across shared faces
/// (structure overhang pasting); `FacesEdgesCorners` is required when the
/// work samples diagonal chunks (meshing with corner-adjacent light/voxels).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Adjacency {
  Faces,
  FacesEdgesCorners,
}

impl Adjacency {
  /// Offset table for this adjacency. Direction index = table index.
  pub fn offsets(self) -> &'static [IVec3] {
    match self {
      Adjacency::Faces => &FACE_OFFSETS,
      Adjacency::FacesEdgesCorners => &FULL_OFFSETS,
    }
  }

  /// Number of directions (6 or 26).
  pub fn count(self) -> usize {
    self.offsets().len()
  }

  /// Direction index of `delta`, or `None` if `delta` is not a neighbor
  /// offset under this adjacency.
  pub fn direction_index(self, delta: IVec3) -> Option<usize> {
    self.offsets().iter().position(|off| *off == delta)
  }
}

// =============================================================================
// NeighborMask - incremental per-chunk readiness
// =============================================================================

/// Fixed-width readiness bitmask, one bit per neighbor direction.
///
/// Bit = 1 means "neighbor not yet ready", 0 means ready. A chunk's wait is
/// satisfied exactly when the whole mask is zero.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NeighborMask(u32);

impl NeighborMask {
  /// Mask with every direction still waiting.
  pub fn all_waiting(adjacency: Adjacency) -> Self {
    Self((1u32 << adjacency.count()) - 1)
  }

  /// Mask with every direction already ready.
  pub fn all_ready() -> Self {
    Self(0)
  }

  pub fn set_ready(&mut self, direction: usize) {
    self.0 &= !(1u32 << direction);
  }

  pub fn set_waiting(&mut self, direction: usize) {
    self.0 |= 1u32 << direction;
  }

  pub fn is_ready(&self, direction: usize) -> bool {
    self.0 & (1u32 << direction) == 0
  }

  /// True when no direction is waiting.
  pub fn all_valid(&self) -> bool {
    self.0 == 0
  }

  /// Number of directions still waiting.
  pub fn waiting_count(&self) -> u32 {
    self.0.count_ones()
  }
}
