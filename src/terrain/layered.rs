//! Layered noise: the composed terrain density field

use glam::Vec3;

use super::buffered::BufferedSampler;

/// Gradient step used when walking away from walls
pub const STEP_SIZE: f32 = 0.5;

/// Walk stops once one step changes the field by no more than this
const SETTLE_DELTA: f32 = 0.05;

const MAX_SETTLE_STEPS: usize = 10_000;

/// A scalar field over world space. Negative is solid, positive is air.
pub trait ScalarField: Send + Sync {
    fn sample(&self, x: f32, y: f32, z: f32) -> f32;
}

impl<F> ScalarField for F
where
    F: Fn(f32, f32, f32) -> f32 + Send + Sync,
{
    fn sample(&self, x: f32, y: f32, z: f32) -> f32 {
        self(x, y, z)
    }
}

/// `f(p) = Σ octave_i(p) + (p.y - vertical_bias)`
///
/// Stateless once built; the buffered lattices are shared read-only, so
/// cloning is cheap and the field can be handed to worker threads.
#[derive(Clone, Debug)]
pub struct LayeredNoise {
    layers: Vec<BufferedSampler>,
    vertical_bias: f32,
}

impl LayeredNoise {
    pub fn new(layers: Vec<BufferedSampler>, vertical_bias: f32) -> Self {
        Self {
            layers,
            vertical_bias,
        }
    }

    /// Ground term alone: solid below `vertical_bias`, air above
    #[inline]
    pub fn bias_at(&self, y: f32) -> f32 {
        y - self.vertical_bias
    }

    pub fn sample(&self, x: f32, y: f32, z: f32) -> f32 {
        let mut value = self.bias_at(y);
        for layer in &self.layers {
            value += layer.sample(x, y, z);
        }
        value
    }

    pub fn sample_at(&self, p: Vec3) -> f32 {
        self.sample(p.x, p.y, p.z)
    }

    pub fn layers(&self) -> &[BufferedSampler] {
        &self.layers
    }

    pub fn vertical_bias(&self) -> f32 {
        self.vertical_bias
    }
}

impl ScalarField for LayeredNoise {
    fn sample(&self, x: f32, y: f32, z: f32) -> f32 {
        LayeredNoise::sample(self, x, y, z)
    }
}

/// Walk up the field's gradient from `start` until it flattens out
///
/// Used to place the viewpoint somewhere reasonably far from walls.
/// The walk is bounded, so a field that never settles still returns.
pub fn find_starting_location(field: &dyn ScalarField, start: Vec3) -> Vec3 {
    let mut p = start;
    let mut last = field.sample(p.x, p.y, p.z);

    for _ in 0..MAX_SETTLE_STEPS {
        let gradient = Vec3::new(
            field.sample(p.x + 1.0, p.y, p.z) - last,
            field.sample(p.x, p.y + 1.0, p.z) - last,
            field.sample(p.x, p.y, p.z + 1.0) - last,
        );
        p += gradient * STEP_SIZE;

        let next = field.sample(p.x, p.y, p.z);
        let delta = next - last;
        last = next;
        if !(delta > SETTLE_DELTA) {
            return p;
        }
    }

    log::warn!("Starting location search did not settle from {:?}", start);
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::blueprint::default_blueprints;
    use crate::terrain::buffered::NoiseComposer;

    fn default_field() -> (NoiseComposer, LayeredNoise) {
        let blueprints = default_blueprints();
        let mut composer = NoiseComposer::new();
        composer.buffer_all(&blueprints).unwrap();
        let field = composer.compose_layered(&blueprints, 8.0).unwrap();
        (composer, field)
    }

    #[test]
    fn test_composition_is_sum_of_layers() {
        let blueprints = default_blueprints();
        let (composer, field) = default_field();

        for &(x, y, z) in &[(0.0, 0.0, 0.0), (13.0, 20.0, -7.0), (-40.2, 3.6, 99.9)] {
            let mut expected = y - 8.0;
            for bp in &blueprints {
                expected += composer.buffered_noise(bp).unwrap().sample(x, y, z);
            }
            assert!((field.sample(x, y, z) - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn test_composition_order_independent() {
        let mut blueprints = default_blueprints();
        let (composer, field) = default_field();
        blueprints.reverse();
        let reversed = composer.compose_layered(&blueprints, 8.0).unwrap();

        for i in 0..50 {
            let t = i as f32 * 3.7;
            let a = field.sample(t, t * 0.5 - 10.0, -t);
            let b = reversed.sample(t, t * 0.5 - 10.0, -t);
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_recompose_identical() {
        let blueprints = default_blueprints();
        let (composer, field) = default_field();
        let again = composer.compose_layered(&blueprints, 8.0).unwrap();
        assert_eq!(field.sample(5.0, 6.0, 7.0).to_bits(), again.sample(5.0, 6.0, 7.0).to_bits());
    }

    #[test]
    fn test_empty_composition_is_ground_plane() {
        let field = NoiseComposer::new().compose_layered(&[], 8.0).unwrap();
        assert_eq!(field.sample(100.0, 8.0, -3.0), 0.0);
        assert!(field.sample(0.0, 0.0, 0.0) < 0.0);
        assert!(field.sample(0.0, 20.0, 0.0) > 0.0);
    }

    #[test]
    fn test_ground_below_air_above() {
        let (_, field) = default_field();
        // Octave amplitudes sum to 20.2 at most, so far from the bias it's all one phase
        assert!(field.sample(10.0, -40.0, 10.0) < 0.0);
        assert!(field.sample(10.0, 60.0, 10.0) > 0.0);
    }

    #[test]
    fn test_closure_field() {
        let plane = |_x: f32, y: f32, _z: f32| y - 2.0;
        assert_eq!(ScalarField::sample(&plane, 0.0, 5.0, 0.0), 3.0);
    }

    #[test]
    fn test_starting_location_on_flat_field() {
        let flat = |_x: f32, _y: f32, _z: f32| 1.0f32;
        let start = Vec3::new(16.0, 18.0, 8.0);
        assert_eq!(find_starting_location(&flat, start), start);
    }

    #[test]
    fn test_starting_location_climbs() {
        // Saturating ramp: climbs along +y until the field stops changing
        let ramp = |_x: f32, y: f32, _z: f32| y.min(10.0);
        let p = find_starting_location(&ramp, Vec3::new(0.0, 0.0, 0.0));
        assert!(p.y >= 9.0, "stopped at {:?}", p);
        assert_eq!(p.x, 0.0);
        assert_eq!(p.z, 0.0);
    }

    #[test]
    fn test_starting_location_terminates_on_unbounded_field() {
        let runaway = |_x: f32, y: f32, _z: f32| y * 2.0;
        let p = find_starting_location(&runaway, Vec3::ZERO);
        assert!(p.y > 0.0);
    }
}
