//! Terrain session configuration

use std::collections::HashSet;
use std::path::Path;

use glam::IVec3;
use serde::{Deserialize, Serialize};

use super::chunk::{CHUNK_SIZE, DEFAULT_RENDER_MASK, RenderMask};
use crate::core::{Error, Result};
use crate::terrain::blueprint::{NoiseBlueprint, default_blueprints};

/// How a worker session obtains its noise field
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMode {
    /// Hand the worker a read-only share of the controller's buffered field
    #[default]
    Shared,
    /// Send only the blueprints; every session buffers its own copy
    PerSession,
}

/// Configuration for a terrain streaming session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Chunk edge length in world units (also the marching dimensions)
    pub chunk_size: i32,
    /// Height of the ground plane the octaves perturb
    pub vertical_bias: f32,
    /// Grid offsets kept materialized around the viewpoint's chunk
    pub render_mask: Vec<IVec3>,
    /// Noise octaves, summed into the density field
    pub blueprints: Vec<NoiseBlueprint>,
    pub field_mode: FieldMode,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            vertical_bias: 8.0,
            render_mask: DEFAULT_RENDER_MASK.to_vec(),
            blueprints: default_blueprints(),
            field_mode: FieldMode::Shared,
        }
    }
}

impl TerrainConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!(
            "Loaded terrain config from {}: {} blueprints, {} mask offsets",
            path.as_ref().display(),
            config.blueprints.len(),
            config.render_mask.len()
        );
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size <= 0 {
            return Err(Error::Config(format!(
                "chunk_size must be positive, got {}",
                self.chunk_size
            )));
        }
        if !self.vertical_bias.is_finite() {
            return Err(Error::Config("vertical_bias must be finite".into()));
        }
        if self.render_mask.is_empty() {
            return Err(Error::Config("render_mask is empty".into()));
        }

        let mut ids = HashSet::new();
        for blueprint in &self.blueprints {
            if !ids.insert(blueprint.id) {
                return Err(Error::Construction(format!(
                    "duplicate blueprint id {}",
                    blueprint.id
                )));
            }
            blueprint.validate()?;
        }
        Ok(())
    }

    pub fn mask(&self) -> RenderMask {
        RenderMask::new(self.render_mask.iter().copied())
    }
}
