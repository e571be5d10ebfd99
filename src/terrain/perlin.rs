//! Improved gradient noise over a fixed permutation table
//!
//! The table is a constant, so every process that uses it produces
//! bit-identical samples for the same input.

use noise::NoiseFn;

const PERMUTATION: [u8; 256] = [
    151, 160, 137, 91, 90, 15, 131, 13, 201, 95, 96, 53, 194, 233, 7, 225,
    140, 36, 103, 30, 69, 142, 8, 99, 37, 240, 21, 10, 23, 190, 6, 148,
    247, 120, 234, 75, 0, 26, 197, 62, 94, 252, 219, 203, 117, 35, 11, 32,
    57, 177, 33, 88, 237, 149, 56, 87, 174, 20, 125, 136, 171, 168, 68, 175,
    74, 165, 71, 134, 139, 48, 27, 166, 77, 146, 158, 231, 83, 111, 229, 122,
    60, 211, 133, 230, 220, 105, 92, 41, 55, 46, 245, 40, 244, 102, 143, 54,
    65, 25, 63, 161, 1, 216, 80, 73, 209, 76, 132, 187, 208, 89, 18, 169,
    200, 196, 135, 130, 116, 188, 159, 86, 164, 100, 109, 198, 173, 186, 3, 64,
    52, 217, 226, 250, 124, 123, 5, 202, 38, 147, 118, 126, 255, 82, 85, 212,
    207, 206, 59, 227, 47, 16, 58, 17, 182, 189, 28, 42, 223, 183, 170, 213,
    119, 248, 152, 2, 44, 154, 163, 70, 221, 153, 101, 155, 167, 43, 172, 9,
    129, 22, 39, 253, 19, 98, 108, 110, 79, 113, 224, 232, 178, 185, 112, 104,
    218, 246, 97, 228, 251, 34, 242, 193, 238, 210, 144, 12, 191, 179, 162, 241,
    81, 51, 145, 235, 249, 14, 239, 107, 49, 192, 214, 31, 181, 199, 106, 157,
    184, 84, 204, 176, 115, 121, 50, 45, 127, 4, 150, 254, 138, 236, 205, 93,
    222, 114, 67, 29, 24, 72, 243, 141, 128, 195, 78, 66, 215, 61, 156, 180,];

/// Permutation table repeated once so `P[i + 1]` never needs a wrap
static P: [u8; 512] = doubled_permutation();

const fn doubled_permutation() -> [u8; 512] {
    let mut out = [0u8; 512];
    let mut i = 0;
    while i < 512 {
        out[i] = PERMUTATION[i & 255];
        i += 1;
    }
    out
}

/// Deterministic, coherent 3D scalar noise (improved Perlin noise)
#[derive(Clone, Copy, Debug, Default)]
pub struct NoiseField;

impl NoiseField {
    pub fn new() -> Self {
        Self
    }

    /// Sample the field at a point. Defined for every real input.
    pub fn sample(&self, x: f64, y: f64, z: f64) -> f64 {
        let floor_x = x.floor();
        let floor_y = y.floor();
        let floor_z = z.floor();

        let xi = lattice_cell(floor_x);
        let yi = lattice_cell(floor_y);
        let zi = lattice_cell(floor_z);

        let x = x - floor_x;
        let y = y - floor_y;
        let z = z - floor_z;

        let u = fade(x);
        let v = fade(y);
        let w = fade(z);

        let a = P[xi] as usize + yi;
        let aa = P[a] as usize + zi;
        let ab = P[a + 1] as usize + zi;
        let b = P[xi + 1] as usize + yi;
        let ba = P[b] as usize + zi;
        let bb = P[b + 1] as usize + zi;

        lerp(
            w,
            lerp(
                v,
                lerp(u, grad(P[aa], x, y, z), grad(P[ba], x - 1.0, y, z)),
                lerp(u, grad(P[ab], x, y - 1.0, z), grad(P[bb], x - 1.0, y - 1.0, z)),
            ),
            lerp(
                v,
                lerp(u, grad(P[aa + 1], x, y, z - 1.0), grad(P[ba + 1], x - 1.0, y, z - 1.0)),
                lerp(
                    u,
                    grad(P[ab + 1], x, y - 1.0, z - 1.0),
                    grad(P[bb + 1], x - 1.0, y - 1.0, z - 1.0),
                ),
            ),
        )
    }
}

impl NoiseFn<f64, 3> for NoiseField {
    fn get(&self, point: [f64; 3]) -> f64 {
        self.sample(point[0], point[1], point[2])
    }
}

/// Integer lattice cell reduced into the table's 0..256 range
#[inline]
fn lattice_cell(floored: f64) -> usize {
    ((floored as i64) & 255) as usize
}

/// Quintic fade curve `6t^5 - 15t^4 + 10t^3`
#[inline]
fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp(t: f64, a: f64, b: f64) -> f64 {
    a + (b - a) * t
}

/// Dot product of the offset vector with one of 12 edge gradients
#[inline]
fn grad(hash: u8, x: f64, y: f64, z: f64) -> f64 {
    let h = hash & 15;
    let u = if h < 8 { x } else { y };
    let v = if h < 4 {
        y
    } else if h == 12 || h == 14 {
        x
    } else {
        z
    };
    (if h & 1 == 0 { u } else { -u }) + (if h & 2 == 0 { v } else { -v })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_value() {
        // Widely published value for the reference permutation table
        let value = NoiseField::new().sample(3.14, 42.0, 7.0);
        assert!((value - 0.136_919_958_784).abs() < 1e-9, "got {}", value);
    }

    #[test]
    fn test_deterministic() {
        let field = NoiseField::new();
        let points = [(0.5, 1.25, -3.75), (100.1, -20.2, 3.3), (-0.01, 0.0, 0.99)];
        for (x, y, z) in points {
            let a = field.sample(x, y, z);
            let b = NoiseField::new().sample(x, y, z);
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_zero_on_lattice_points() {
        let field = NoiseField::new();
        for i in -5..5 {
            let value = field.sample(i as f64, (i * 3) as f64, (i * 7) as f64);
            assert_eq!(value, 0.0);
        }
    }

    #[test]
    fn test_bounded() {
        let field = NoiseField::new();
        for i in 0..2000 {
            let t = i as f64 * 0.173;
            let value = field.sample(t, t * 0.31 - 4.0, 11.0 - t * 0.57);
            assert!(value.abs() <= 1.1, "out of range: {}", value);
        }
    }

    #[test]
    fn test_continuous() {
        let field = NoiseField::new();
        let base = field.sample(1.3, 2.7, -0.4);
        let nudged = field.sample(1.3 + 1e-6, 2.7, -0.4);
        assert!((base - nudged).abs() < 1e-4);
    }

    #[test]
    fn test_negative_and_huge_inputs() {
        let field = NoiseField::new();
        assert!(field.sample(-1234.5, -0.5, -77.25).is_finite());
        assert!(field.sample(1e12 + 0.5, 3.5, -1e12 + 0.25).is_finite());
    }

    #[test]
    fn test_noise_fn_matches_sample() {
        let field = NoiseField::new();
        assert_eq!(field.get([0.3, 0.6, 0.9]), field.sample(0.3, 0.6, 0.9));
    }

    #[test]
    fn test_fade_endpoints() {
        assert_eq!(fade(0.0), 0.0);
        assert_eq!(fade(1.0), 1.0);
        assert_eq!(fade(0.5), 0.5);
    }
}
