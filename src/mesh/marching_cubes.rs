//! Marching cubes over a sampled scalar field

use glam::{IVec3, UVec3, Vec3};

use super::tables::{CORNERS, EDGE_CORNERS, EDGE_TABLE, TRI_TABLE};
use super::ChunkMesher;
use crate::terrain::ScalarField;

/// Differences below this are treated as equal when placing a vertex
const EPSILON: f32 = 1e-5;

/// Classic table-driven marching cubes
///
/// Corners at or above `isolevel` are air. Samples `(dims + 1)³` lattice
/// points so neighbouring chunks agree on their shared faces.
#[derive(Clone, Copy, Debug)]
pub struct MarchingCubes {
    pub isolevel: f32,
}

impl Default for MarchingCubes {
    fn default() -> Self {
        Self { isolevel: 0.0 }
    }
}

impl MarchingCubes {
    pub fn new(isolevel: f32) -> Self {
        Self { isolevel }
    }

    fn interpolate(&self, p1: Vec3, p2: Vec3, v1: f32, v2: f32) -> Vec3 {
        if (self.isolevel - v1).abs() < EPSILON {
            return p1;
        }
        if (self.isolevel - v2).abs() < EPSILON {
            return p2;
        }
        if (v1 - v2).abs() < EPSILON {
            return p1;
        }
        let mu = (self.isolevel - v1) / (v2 - v1);
        p1 + (p2 - p1) * mu
    }
}

impl ChunkMesher for MarchingCubes {
    fn march(&self, field: &dyn ScalarField, origin: IVec3, dims: UVec3) -> Vec<f32> {
        let (nx, ny, nz) = (dims.x as usize, dims.y as usize, dims.z as usize);
        let (sx, sy, sz) = (nx + 1, ny + 1, nz + 1);
        let at = |x: usize, y: usize, z: usize| x + sx * (y + sy * z);

        let mut samples = vec![0.0f32; sx * sy * sz];
        for z in 0..sz {
            for y in 0..sy {
                for x in 0..sx {
                    samples[at(x, y, z)] = field.sample(
                        (origin.x + x as i32) as f32,
                        (origin.y + y as i32) as f32,
                        (origin.z + z as i32) as f32,
                    );
                }
            }
        }

        let mut out = Vec::new();
        let mut values = [0.0f32; 8];
        let mut positions = [Vec3::ZERO; 8];
        let mut edge_vertices = [Vec3::ZERO; 12];

        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let mut cube_index = 0usize;
                    for (i, c) in CORNERS.iter().enumerate() {
                        let (cx, cy, cz) =
                            (x + c[0] as usize, y + c[1] as usize, z + c[2] as usize);
                        values[i] = samples[at(cx, cy, cz)];
                        positions[i] = Vec3::new(cx as f32, cy as f32, cz as f32);
                        if values[i] < self.isolevel {
                            cube_index |= 1 << i;
                        }
                    }

                    let edges = EDGE_TABLE[cube_index];
                    if edges == 0 {
                        continue;
                    }

                    for (e, &[a, b]) in EDGE_CORNERS.iter().enumerate() {
                        if edges & (1 << e) != 0 {
                            edge_vertices[e] =
                                self.interpolate(positions[a], positions[b], values[a], values[b]);
                        }
                    }

                    for tri in TRI_TABLE[cube_index].chunks_exact(3) {
                        if tri[0] < 0 {
                            break;
                        }
                        for &e in tri {
                            let v = edge_vertices[e as usize];
                            out.extend_from_slice(&[v.x, v.y, v.z]);
                        }
                    }
                }
            }
        }

        out
    }
}
