//! Exports of the layered noise for GPU evaluation
//!
//! The same blueprints that drive the CPU field can be evaluated in a
//! shader: [`layered_noise_wgsl`] emits the sum as a WGSL function and
//! [`noise_textures`] hands out the buffered lattices as 3D texture data.

pub mod shader;
pub mod texture;

pub use shader::layered_noise_wgsl;
pub use texture::{NoiseTexture3d, noise_textures};
