//! Noise blueprints: one octave of the layered terrain field

use std::fmt;

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Determinants below this are treated as singular
const MIN_DETERMINANT: f32 = 1e-12;

/// Stable identifier of a blueprint within a terrain session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlueprintId(pub u32);

impl fmt::Display for BlueprintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Configuration for one noise octave
///
/// `input_transform` maps lattice coordinates into noise space when the
/// octave is buffered. `output_transform` maps world coordinates into
/// lattice coordinates when it is sampled. The sampled lattice value is
/// multiplied by `sample_scale`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseBlueprint {
    pub id: BlueprintId,
    pub input_transform: Mat4,
    pub output_transform: Mat4,
    pub sample_scale: f32,
}

impl NoiseBlueprint {
    pub fn new(id: u32, input_transform: Mat4, output_transform: Mat4, sample_scale: f32) -> Self {
        Self {
            id: BlueprintId(id),
            input_transform,
            output_transform,
            sample_scale,
        }
    }

    /// Reject blueprints that cannot produce a well-defined field
    ///
    /// Both transforms must be finite and affine. The input transform must
    /// also be invertible, otherwise the buffered lattice collapses onto a
    /// plane or line of noise space. The output transform may be singular
    /// (flattening an axis is a legitimate way to build a 2D octave).
    pub fn validate(&self) -> Result<()> {
        check_affine(self.id, "input", &self.input_transform)?;
        check_affine(self.id, "output", &self.output_transform)?;

        let det = self.input_transform.determinant();
        if !det.is_finite() || det.abs() < MIN_DETERMINANT {
            return Err(Error::Construction(format!(
                "blueprint {}: input transform is not invertible (det = {})",
                self.id, det
            )));
        }

        if !self.sample_scale.is_finite() {
            return Err(Error::Construction(format!(
                "blueprint {}: sample scale {} is not finite",
                self.id, self.sample_scale
            )));
        }

        Ok(())
    }

    /// Map a lattice coordinate into noise space
    #[inline]
    pub fn map_input(&self, p: Vec3) -> Vec3 {
        self.input_transform.transform_point3(p)
    }

    /// Map a world coordinate into lattice space
    #[inline]
    pub fn map_output(&self, p: Vec3) -> Vec3 {
        self.output_transform.transform_point3(p)
    }
}

fn check_affine(id: BlueprintId, which: &str, m: &Mat4) -> Result<()> {
    if !m.is_finite() {
        return Err(Error::Construction(format!(
            "blueprint {}: {} transform has non-finite elements",
            id, which
        )));
    }
    if m.row(3) != Vec4::W {
        return Err(Error::Construction(format!(
            "blueprint {}: {} transform is not affine (bottom row {:?})",
            id, which, m.row(3)
        )));
    }
    Ok(())
}

/// The four octaves used by the default terrain session
pub fn default_blueprints() -> Vec<NoiseBlueprint> {
    vec![
        NoiseBlueprint::new(
            0,
            Mat4::from_scale(Vec3::new(0.1, 0.2, 0.1)),
            Mat4::from_translation(Vec3::splat(4.0)),
            8.0,
        ),
        NoiseBlueprint::new(
            1,
            Mat4::from_scale(Vec3::new(0.2, 0.1, 0.1)),
            Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)),
            8.0,
        ),
        NoiseBlueprint::new(
            2,
            Mat4::from_scale(Vec3::splat(0.07)),
            Mat4::from_translation(Vec3::splat(8.0)),
            4.0,
        ),
        NoiseBlueprint::new(
            3,
            Mat4::from_scale(Vec3::splat(0.15)),
            Mat4::IDENTITY,
            0.2,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_blueprints_valid() {
        let blueprints = default_blueprints();
        assert_eq!(blueprints.len(), 4);
        for (i, bp) in blueprints.iter().enumerate() {
            assert_eq!(bp.id, BlueprintId(i as u32));
            bp.validate().unwrap();
        }
    }

    #[test]
    fn test_singular_output_allowed() {
        let bp = NoiseBlueprint::new(
            7,
            Mat4::IDENTITY,
            Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)),
            1.0,
        );
        assert!(bp.validate().is_ok());
    }

    #[test]
    fn test_singular_input_rejected() {
        let bp = NoiseBlueprint::new(
            1,
            Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)),
            Mat4::IDENTITY,
            1.0,
        );
        assert!(matches!(bp.validate(), Err(Error::Construction(_))));
    }

    #[test]
    fn test_non_finite_scale_rejected() {
        let bp = NoiseBlueprint::new(2, Mat4::IDENTITY, Mat4::IDENTITY, f32::NAN);
        assert!(matches!(bp.validate(), Err(Error::Construction(_))));

        let bp = NoiseBlueprint::new(2, Mat4::IDENTITY, Mat4::IDENTITY, f32::INFINITY);
        assert!(matches!(bp.validate(), Err(Error::Construction(_))));
    }

    #[test]
    fn test_projective_transform_rejected() {
        // Uniformly scaling every element also scales w
        let bp = NoiseBlueprint::new(3, Mat4::IDENTITY * 0.1, Mat4::IDENTITY, 1.0);
        assert!(matches!(bp.validate(), Err(Error::Construction(_))));
    }

    #[test]
    fn test_non_finite_transform_rejected() {
        let mut output = Mat4::IDENTITY;
        output.w_axis.x = f32::NAN;
        let bp = NoiseBlueprint::new(4, Mat4::IDENTITY, output, 1.0);
        assert!(matches!(bp.validate(), Err(Error::Construction(_))));
    }

    #[test]
    fn test_map_output_translation() {
        let bp = &default_blueprints()[0];
        assert_eq!(bp.map_output(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(5.0, 6.0, 7.0));
    }

    #[test]
    fn test_serde_roundtrip_keeps_id() {
        let bp = default_blueprints().remove(2);
        let json = serde_json::to_string(&bp).unwrap();
        let back: NoiseBlueprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bp);
    }
}
