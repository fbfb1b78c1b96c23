//! Random control-point displacements.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geom::Vec3;

/// One control-point displacement split into direction and length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perturbation {
    /// Unit vector with non-negative components.
    pub direction: Vec3,
    pub magnitude: f64,
}

impl Perturbation {
    #[must_use]
    pub fn displacement(&self) -> Vec3 {
        self.direction * self.magnitude
    }
}

/// Draws displacements for the eight polytope corners.
///
/// Each direction is three `U[0,1)` draws normalized to unit length, so it
/// always points into the positive octant and clusters around the
/// `(1,1,1)` diagonal. Magnitudes are `U[0, max_magnitude]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerturbationGenerator {
    max_magnitude: f64,
}

impl PerturbationGenerator {
    /// `max_magnitude` is clamped to a finite non-negative value.
    #[must_use]
    pub fn new(max_magnitude: f64) -> Self {
        let max_magnitude = if max_magnitude.is_finite() { max_magnitude.max(0.0) } else { 0.0 };
        Self { max_magnitude }
    }

    #[must_use]
    pub const fn max_magnitude(&self) -> f64 {
        self.max_magnitude
    }

    pub fn generate<R: Rng>(&self, rng: &mut R) -> [Vec3; 8] {
        self.generate_detailed(rng).map(|p| p.displacement())
    }

    pub fn generate_detailed<R: Rng>(&self, rng: &mut R) -> [Perturbation; 8] {
        std::array::from_fn(|_| {
            let direction = random_direction(rng);
            let magnitude = if self.max_magnitude > 0.0 {
                rng.random_range(0.0..=self.max_magnitude)
            } else {
                0.0
            };
            Perturbation { direction, magnitude }
        })
    }
}

fn random_direction<R: Rng>(rng: &mut R) -> Vec3 {
    loop {
        let raw = Vec3::new(rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>());
        if let Some(direction) = raw.normalized() {
            return direction;
        }
    }
}

/// Independent generator for sample `index` of a run seeded with `seed`.
///
/// Sample streams depend only on `(seed, index)`, so samples can be drawn in
/// any order or in parallel.
#[must_use]
pub fn sample_rng(seed: u64, index: usize) -> StdRng {
    let mixed = splitmix64(seed ^ splitmix64(index as u64));
    StdRng::seed_from_u64(mixed)
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
