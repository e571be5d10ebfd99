//! Procedural terrain density: noise, blueprints and buffered octaves

pub mod perlin;
pub mod blueprint;
pub mod buffered;
pub mod layered;

pub use perlin::NoiseField;
pub use blueprint::{BlueprintId, NoiseBlueprint, default_blueprints};
pub use buffered::{
    BufferedNoiseField, BufferedSampler, NoiseComposer,
    BUFFER_SIZE, BUFFER_LEN, wrap_coord,
};
pub use layered::{LayeredNoise, ScalarField, find_starting_location};
