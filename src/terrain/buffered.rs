//! Buffered noise: blueprints memoized into fixed-size lattices
//!
//! Each blueprint is sampled once into a 64³ lattice. Lookups round the
//! query point, push it through the blueprint's output transform and wrap
//! each axis with `|c| mod 64`. The wrap mirrors around zero and repeats
//! every 64 cells; it is not a periodic noise, so seams are expected.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use glam::{Mat4, Vec3};
use noise::NoiseFn;
use rayon::prelude::*;

use super::blueprint::{BlueprintId, NoiseBlueprint};
use super::layered::LayeredNoise;
use super::perlin::NoiseField;
use crate::core::{Error, Result};

/// Lattice edge length in samples
pub const BUFFER_SIZE: usize = 64;

/// Samples per lattice
pub const BUFFER_LEN: usize = BUFFER_SIZE * BUFFER_SIZE * BUFFER_SIZE;

/// Round half up, matching the rounding used on the GPU side
#[inline]
fn round_half_up(v: f32) -> f32 {
    (v + 0.5).floor()
}

/// Wrap a lattice coordinate into `0..BUFFER_SIZE`
#[inline]
pub fn wrap_coord(c: i64) -> usize {
    (c.unsigned_abs() % BUFFER_SIZE as u64) as usize
}

/// Dense 64³ lattice of noise samples for one blueprint
#[derive(Clone)]
pub struct BufferedNoiseField {
    id: BlueprintId,
    /// Input transform the lattice was sampled through
    input_transform: Mat4,
    /// x-major: `x + 64 * y + 64 * 64 * z`
    data: Box<[f32]>,
}

impl BufferedNoiseField {
    /// Sample `source` through the blueprint's input transform
    ///
    /// z-slabs are filled in parallel.
    pub fn sample<N>(source: &N, blueprint: &NoiseBlueprint) -> Self
    where
        N: NoiseFn<f64, 3> + Sync,
    {
        let mut data = vec![0.0f32; BUFFER_LEN].into_boxed_slice();

        data.par_chunks_mut(BUFFER_SIZE * BUFFER_SIZE)
            .enumerate()
            .for_each(|(k, slab)| {
                for j in 0..BUFFER_SIZE {
                    for i in 0..BUFFER_SIZE {
                        let p = blueprint.map_input(Vec3::new(i as f32, j as f32, k as f32));
                        slab[i + BUFFER_SIZE * j] =
                            source.get([p.x as f64, p.y as f64, p.z as f64]) as f32;
                    }
                }
            });

        Self {
            id: blueprint.id,
            input_transform: blueprint.input_transform,
            data,
        }
    }

    pub fn id(&self) -> BlueprintId {
        self.id
    }

    #[inline]
    pub fn index(x: usize, y: usize, z: usize) -> usize {
        x + BUFFER_SIZE * y + BUFFER_SIZE * BUFFER_SIZE * z
    }

    /// Raw lattice value, coordinates in `0..64`
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.data[Self::index(x, y, z)]
    }

    /// Lattice value at any integer coordinate, wrapped per axis
    #[inline]
    pub fn get_wrapped(&self, x: i64, y: i64, z: i64) -> f32 {
        self.get(wrap_coord(x), wrap_coord(y), wrap_coord(z))
    }

    /// All samples in upload order (x fastest)
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    fn matches(&self, blueprint: &NoiseBlueprint) -> bool {
        self.input_transform == blueprint.input_transform
    }
}

impl fmt::Debug for BufferedNoiseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedNoiseField")
            .field("id", &self.id)
            .field("samples", &self.data.len())
            .finish()
    }
}

/// O(1) lookup into one buffered octave
#[derive(Clone, Debug)]
pub struct BufferedSampler {
    field: Arc<BufferedNoiseField>,
    output_transform: Mat4,
    sample_scale: f32,
}

impl BufferedSampler {
    /// Lattice cell a world point resolves to
    pub fn lattice_coord(&self, x: f32, y: f32, z: f32) -> (usize, usize, usize) {
        let p = Vec3::new(round_half_up(x), round_half_up(y), round_half_up(z));
        let q = self.output_transform.transform_point3(p);
        (
            wrap_coord(round_half_up(q.x) as i64),
            wrap_coord(round_half_up(q.y) as i64),
            wrap_coord(round_half_up(q.z) as i64),
        )
    }

    #[inline]
    pub fn sample(&self, x: f32, y: f32, z: f32) -> f32 {
        let (i, j, k) = self.lattice_coord(x, y, z);
        self.field.get(i, j, k) * self.sample_scale
    }

    pub fn field(&self) -> &Arc<BufferedNoiseField> {
        &self.field
    }

    pub fn sample_scale(&self) -> f32 {
        self.sample_scale
    }
}

/// Owns the buffered lattices of a terrain session, keyed by blueprint id
pub struct NoiseComposer<N = NoiseField> {
    source: N,
    fields: HashMap<BlueprintId, Arc<BufferedNoiseField>>,
}

impl NoiseComposer<NoiseField> {
    pub fn new() -> Self {
        Self::with_source(NoiseField::new())
    }
}

impl Default for NoiseComposer<NoiseField> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> NoiseComposer<N>
where
    N: NoiseFn<f64, 3> + Sync,
{
    /// Buffer lattices from any `noise` source instead of the fixed field
    pub fn with_source(source: N) -> Self {
        Self {
            source,
            fields: HashMap::new(),
        }
    }

    /// Sample a blueprint into its lattice
    ///
    /// Re-buffering the same id replaces the previous lattice.
    pub fn buffer_noise(&mut self, blueprint: &NoiseBlueprint) -> Result<()> {
        blueprint.validate()?;
        let field = BufferedNoiseField::sample(&self.source, blueprint);
        if self.fields.insert(blueprint.id, Arc::new(field)).is_some() {
            log::debug!("Re-buffered noise blueprint {}", blueprint.id);
        } else {
            log::debug!("Buffered noise blueprint {}", blueprint.id);
        }
        Ok(())
    }

    pub fn buffer_all(&mut self, blueprints: &[NoiseBlueprint]) -> Result<()> {
        for blueprint in blueprints {
            self.buffer_noise(blueprint)?;
        }
        Ok(())
    }

    pub fn is_buffered(&self, id: BlueprintId) -> bool {
        self.fields.contains_key(&id)
    }

    pub fn field(&self, id: BlueprintId) -> Option<&Arc<BufferedNoiseField>> {
        self.fields.get(&id)
    }

    /// Sampler for one buffered blueprint
    ///
    /// Fails if the blueprint was never buffered, or if its input transform
    /// no longer matches the one the lattice was sampled through.
    pub fn buffered_noise(&self, blueprint: &NoiseBlueprint) -> Result<BufferedSampler> {
        let field = self
            .fields
            .get(&blueprint.id)
            .ok_or(Error::NotBuffered(blueprint.id))?;
        if !field.matches(blueprint) {
            return Err(Error::StaleBuffer(blueprint.id));
        }
        Ok(BufferedSampler {
            field: Arc::clone(field),
            output_transform: blueprint.output_transform,
            sample_scale: blueprint.sample_scale,
        })
    }

    /// Sum of all buffered octaves plus the `y - vertical_bias` ground term
    pub fn compose_layered(
        &self,
        blueprints: &[NoiseBlueprint],
        vertical_bias: f32,
    ) -> Result<LayeredNoise> {
        let layers = blueprints
            .iter()
            .map(|bp| self.buffered_noise(bp))
            .collect::<Result<Vec<_>>>()?;
        Ok(LayeredNoise::new(layers, vertical_bias))
    }
}
