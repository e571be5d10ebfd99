//! Buffered lattices as 3D texture data

use crate::core::Result;
use crate::terrain::{BUFFER_SIZE, NoiseBlueprint, NoiseComposer};

use super::shader::texture_binding_name;

/// One single-channel float 3D texture, `size³` texels
///
/// Texel order is x fastest, then y, then z, matching the lattice layout,
/// so the data uploads as-is. Read it with `textureLoad`; no sampler is bound.
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseTexture3d {
    pub label: String,
    pub size: u32,
    pub data: Vec<f32>,
}

impl NoiseTexture3d {
    /// Raw texel bytes for upload
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.size * std::mem::size_of::<f32>() as u32
    }

    pub fn rows_per_image(&self) -> u32 {
        self.size
    }
}

/// One texture per blueprint, in blueprint order
///
/// Labels match the binding names emitted by
/// [`layered_noise_wgsl`](super::layered_noise_wgsl) for the same `name`.
/// Fails if any blueprint is not buffered, or is stale, in `composer`.
pub fn noise_textures<N>(
    composer: &NoiseComposer<N>,
    blueprints: &[NoiseBlueprint],
    name: &str,
) -> Result<Vec<NoiseTexture3d>>
where
    N: noise::NoiseFn<f64, 3> + Sync,
{
    blueprints
        .iter()
        .enumerate()
        .map(|(i, blueprint)| {
            let sampler = composer.buffered_noise(blueprint)?;
            Ok(NoiseTexture3d {
                label: texture_binding_name(name, i),
                size: BUFFER_SIZE as u32,
                data: sampler.field().data().to_vec(),
            })
        })
        .collect()
}
