//! Chunk keys, render masks and materialized chunks

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use super::scene::MeshHandle;
use crate::mesh::FLOATS_PER_TRIANGLE;

/// Default chunk edge length in world units
pub const CHUNK_SIZE: i32 = 32;

/// Bits per axis in [`ChunkKey::packed`]
const PACK_BITS: u32 = 21;
const PACK_MASK: u64 = (1 << PACK_BITS) - 1;

/// Forward-weighted mask: the current cell, its side neighbours and two
/// rows ahead along -z
pub const DEFAULT_RENDER_MASK: [IVec3; 9] = [
    IVec3::new(0, 0, -1),
    IVec3::new(1, 0, -1),
    IVec3::new(0, 0, 0),
    IVec3::new(-1, 0, -1),
    IVec3::new(0, 0, -2),
    IVec3::new(-1, 0, 0),
    IVec3::new(-1, 0, -2),
    IVec3::new(1, 0, 0),
    IVec3::new(1, 0, -2),
];

/// Chunk-grid coordinate, used directly as the cache key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ChunkKey {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkKey {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Grid cell containing a world position: `floor(pos / chunk_size)` per axis
    ///
    /// Positions beyond the grid saturate to its edge.
    pub fn from_world_pos(pos: Vec3, chunk_size: i32) -> Self {
        let size = chunk_size as f32;
        Self {
            x: (pos.x / size).floor() as i32,
            y: (pos.y / size).floor() as i32,
            z: (pos.z / size).floor() as i32,
        }
    }

    /// World-space origin (minimum corner) of this chunk
    pub fn world_origin(&self, chunk_size: i32) -> IVec3 {
        self.as_ivec3() * chunk_size
    }

    /// Origin of this chunk, if its whole extent `origin..=origin + chunk_size`
    /// is representable in world coordinates
    pub fn checked_world_origin(&self, chunk_size: i32) -> Option<IVec3> {
        let axis = |c: i32| {
            let origin = c.checked_mul(chunk_size)?;
            origin.checked_add(chunk_size)?;
            Some(origin)
        };
        Some(IVec3::new(axis(self.x)?, axis(self.y)?, axis(self.z)?))
    }

    pub fn offset(&self, by: IVec3) -> Self {
        Self::from(self.as_ivec3() + by)
    }

    /// `offset`, or `None` if any axis leaves the `i32` grid
    pub fn checked_offset(&self, by: IVec3) -> Option<Self> {
        Some(Self::new(
            self.x.checked_add(by.x)?,
            self.y.checked_add(by.y)?,
            self.z.checked_add(by.z)?,
        ))
    }

    pub fn as_ivec3(&self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }

    /// Collision-free integer form, valid for |coord| < 2^20 per axis
    pub fn packed(&self) -> u64 {
        let pack = |v: i32| (v as i64 as u64) & PACK_MASK;
        pack(self.x) | (pack(self.y) << PACK_BITS) | (pack(self.z) << (2 * PACK_BITS))
    }

    /// Legacy `x*11 + y*13 + z*17` label
    ///
    /// Distinct cells share this value (e.g. `(13, -11, 0)` and the origin),
    /// so it is only good for log output, never for identity.
    pub fn weighted_sum(&self) -> i64 {
        self.x as i64 * 11 + self.y as i64 * 13 + self.z as i64 * 17
    }
}

impl From<IVec3> for ChunkKey {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Fixed list of grid offsets kept materialized around the center
///
/// Order is preserved (requests go out in mask order); duplicates collapse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderMask {
    offsets: Vec<IVec3>,
}

impl RenderMask {
    pub fn new(offsets: impl IntoIterator<Item = IVec3>) -> Self {
        let mut unique: Vec<IVec3> = Vec::new();
        for offset in offsets {
            if !unique.contains(&offset) {
                unique.push(offset);
            }
        }
        Self { offsets: unique }
    }

    /// Every offset in the `(2r+1)³` cube around the center
    pub fn cube(radius: i32) -> Self {
        let r = radius.max(0);
        let mut offsets = Vec::new();
        for y in -r..=r {
            for z in -r..=r {
                for x in -r..=r {
                    offsets.push(IVec3::new(x, y, z));
                }
            }
        }
        Self::new(offsets)
    }

    pub fn offsets(&self) -> &[IVec3] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Keys of `center + offset` for every offset, in mask order
    ///
    /// Offsets that would step off the edge of the grid are skipped.
    pub fn desired_keys(&self, center: ChunkKey) -> Vec<ChunkKey> {
        self.offsets
            .iter()
            .filter_map(|&o| {
                let key = center.checked_offset(o);
                if key.is_none() {
                    log::warn!("Mask offset {:?} from {:?} is off the grid", o, center);
                }
                key
            })
            .collect()
    }
}

impl Default for RenderMask {
    fn default() -> Self {
        Self::new(DEFAULT_RENDER_MASK)
    }
}

/// A materialized chunk of terrain geometry
#[derive(Debug)]
pub struct Chunk {
    pub key: ChunkKey,
    pub world_origin: IVec3,
    /// Chunk-local, nine floats per triangle
    pub triangles: Vec<f32>,
    /// Scene mesh, absent when the chunk produced no triangles
    pub handle: Option<MeshHandle>,
}

impl Chunk {
    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / FLOATS_PER_TRIANGLE
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_from_world_pos() {
        assert_eq!(ChunkKey::from_world_pos(Vec3::new(0.0, 0.0, 0.0), 32), ChunkKey::new(0, 0, 0));
        assert_eq!(
            ChunkKey::from_world_pos(Vec3::new(31.9, 32.0, 64.5), 32),
            ChunkKey::new(0, 1, 2)
        );
        assert_eq!(
            ChunkKey::from_world_pos(Vec3::new(-0.1, -32.0, -32.1), 32),
            ChunkKey::new(-1, -1, -2)
        );
    }

    #[test]
    fn test_world_origin() {
        assert_eq!(ChunkKey::new(1, -2, 3).world_origin(32), IVec3::new(32, -64, 96));
    }

    #[test]
    fn test_checked_world_origin() {
        assert_eq!(ChunkKey::new(1, -2, 3).checked_world_origin(32), Some(IVec3::new(32, -64, 96)));
        assert_eq!(ChunkKey::new(i32::MAX, 0, 0).checked_world_origin(32), None);
        // Origin fits but the far face does not
        let edge = i32::MAX / 32;
        assert_eq!(ChunkKey::new(edge, 0, 0).checked_world_origin(32), None);
        assert!(ChunkKey::new(edge - 1, 0, 0).checked_world_origin(32).is_some());
        assert_eq!(ChunkKey::new(0, 0, 2).checked_world_origin(i32::MAX / 2), None);
    }

    #[test]
    fn test_desired_keys_skip_grid_edge() {
        let mask = RenderMask::new([IVec3::new(-1, 0, 0), IVec3::ZERO, IVec3::new(1, 0, 0)]);
        let keys = mask.desired_keys(ChunkKey::new(i32::MAX, 0, i32::MIN));
        assert_eq!(
            keys,
            vec![ChunkKey::new(i32::MAX - 1, 0, i32::MIN), ChunkKey::new(i32::MAX, 0, i32::MIN)]
        );
    }

    #[test]
    fn test_weighted_sum_values() {
        assert_eq!(ChunkKey::new(0, 0, 0).weighted_sum(), 0);
        assert_eq!(ChunkKey::new(1, 0, 0).weighted_sum(), 11);
        assert_eq!(ChunkKey::new(0, 1, 1).weighted_sum(), 30);
    }

    #[test]
    fn test_weighted_sum_collides_where_keys_do_not() {
        let a = ChunkKey::new(0, 0, 0);
        let b = ChunkKey::new(13, -11, 0);
        assert_eq!(a.weighted_sum(), b.weighted_sum());
        assert_ne!(a, b);
        assert_ne!(a.packed(), b.packed());
    }

    #[test]
    fn test_packed_unique_in_neighbourhood() {
        let mut seen = HashSet::new();
        for x in -20..=20 {
            for y in -20..=20 {
                for z in -20..=20 {
                    assert!(seen.insert(ChunkKey::new(x, y, z).packed()));
                }
            }
        }
    }

    #[test]
    fn test_mask_dedups_in_order() {
        let mask = RenderMask::new([
            IVec3::new(0, 0, -2),
            IVec3::ZERO,
            IVec3::new(0, 0, -2),
        ]);
        assert_eq!(mask.offsets(), &[IVec3::new(0, 0, -2), IVec3::ZERO]);
    }

    #[test]
    fn test_default_mask() {
        let mask = RenderMask::default();
        assert_eq!(mask.len(), 9);
        assert!(mask.offsets().contains(&IVec3::ZERO));
        // Weighted toward -z
        assert!(mask.offsets().iter().all(|o| o.z <= 0));
    }

    #[test]
    fn test_cube_mask() {
        assert_eq!(RenderMask::cube(0).offsets(), &[IVec3::ZERO]);
        assert_eq!(RenderMask::cube(1).len(), 27);
    }

    #[test]
    fn test_desired_keys() {
        let mask = RenderMask::new([IVec3::ZERO, IVec3::new(1, 0, -1)]);
        let keys = mask.desired_keys(ChunkKey::new(5, 0, 5));
        assert_eq!(keys, vec![ChunkKey::new(5, 0, 5), ChunkKey::new(6, 0, 4)]);
    }
}
