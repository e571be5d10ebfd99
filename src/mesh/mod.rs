//! Chunk triangulation

pub mod tables;
pub mod marching_cubes;

pub use marching_cubes::MarchingCubes;

use glam::{IVec3, UVec3};

use crate::terrain::ScalarField;

/// Floats per triangle in a flat vertex buffer (3 vertices × xyz)
pub const FLOATS_PER_TRIANGLE: usize = 9;

/// Turns a scalar field over a chunk volume into a flat triangle buffer
///
/// Output is chunk-local, three floats per vertex, nine per triangle, no
/// indices and no normals. Implementations must be a pure function of the
/// field and their arguments; they run on worker threads.
pub trait ChunkMesher: Send + Sync {
    fn march(&self, field: &dyn ScalarField, origin: IVec3, dims: UVec3) -> Vec<f32>;
}
