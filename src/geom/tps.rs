//! Thin-plate spline warps in three dimensions.
//!
//! A spline is built from `k` landmark pairs `(s_i, t_i)` and evaluates as
//!
//! ```text
//! f(p) = c + B·p + Σ_i w_i · φ(|p − s_i|),    φ(r) = r
//! ```
//!
//! `φ(r) = r` is the biharmonic kernel in 3D (the `r² log r` kernel is the
//! 2D one). The coefficients solve the block system
//!
//! ```text
//! | K   P | |W|   |T|
//! | Pᵀ  0 | |A| = |0|
//! ```
//!
//! with `K_ij = φ(|s_i − s_j|)`, `P_i = [1, s_i]` and `T` the target
//! positions, once for each output coordinate. The `Pᵀ W = 0` rows keep the
//! radial part orthogonal to affine maps, so the spline interpolates every
//! landmark exactly, reproduces affine maps exactly, and has the least
//! bending energy among interpolants.

use nalgebra::DMatrix;

use super::deformation::DeformationField;
use super::obb::ControlPolytope;
use super::{Point3, Tolerance, Vec3};

/// Errors raised while building a thin-plate spline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SplineError {
    #[error("thin-plate spline needs at least {min} landmarks, got {count}")]
    TooFewLandmarks { count: usize, min: usize },
    #[error("{sources} source landmarks but {targets} target landmarks")]
    LandmarkCountMismatch { sources: usize, targets: usize },
    #[error("landmark {index} has non-finite coordinates")]
    NonFiniteLandmark { index: usize },
    #[error("landmark system is singular (reciprocal condition {reciprocal_condition:e})")]
    Singular { reciprocal_condition: f64 },
}

/// Paired source/target landmarks for one deformation sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkCorrespondence {
    pub source: [Point3; 8],
    pub target: [Point3; 8],
}

impl LandmarkCorrespondence {
    #[must_use]
    pub const fn new(source: [Point3; 8], target: [Point3; 8]) -> Self {
        Self { source, target }
    }

    /// Polytope corners as sources, each moved by its displacement as target.
    #[must_use]
    pub fn from_displacements(polytope: &ControlPolytope, displacements: &[Vec3; 8]) -> Self {
        Self {
            source: *polytope.points(),
            target: polytope.displaced(displacements),
        }
    }
}

/// A solved thin-plate spline.
#[derive(Debug, Clone, PartialEq)]
pub struct ThinPlateSpline {
    sources: Vec<Point3>,
    weights: Vec<Vec3>,
    constant: Vec3,
    linear: [Vec3; 3],
    // Landmarks are solved in a centered, unit-scaled frame for conditioning.
    origin: Point3,
    scale: f64,
}

impl ThinPlateSpline {
    /// Minimum number of landmarks for a non-degenerate 3D affine part.
    pub const MIN_LANDMARKS: usize = 4;

    /// Build the spline for a control polytope correspondence.
    pub fn new(correspondence: &LandmarkCorrespondence) -> Result<Self, SplineError> {
        Self::from_landmarks(&correspondence.source, &correspondence.target)
    }

    /// Build a spline for an arbitrary number of landmark pairs.
    ///
    /// # Errors
    /// Fails on mismatched or too few landmarks, non-finite coordinates, and
    /// configurations whose system is singular (coincident or coplanar
    /// landmarks).
    pub fn from_landmarks(sources: &[Point3], targets: &[Point3]) -> Result<Self, SplineError> {
        if sources.len() != targets.len() {
            return Err(SplineError::LandmarkCountMismatch {
                sources: sources.len(),
                targets: targets.len(),
            });
        }
        let k = sources.len();
        if k < Self::MIN_LANDMARKS {
            return Err(SplineError::TooFewLandmarks {
                count: k,
                min: Self::MIN_LANDMARKS,
            });
        }
        if let Some(index) = sources
            .iter()
            .zip(targets)
            .position(|(s, t)| !s.is_finite() || !t.is_finite())
        {
            return Err(SplineError::NonFiniteLandmark { index });
        }

        let (origin, scale) = normalization(sources);
        let local: Vec<Point3> = sources
            .iter()
            .map(|s| Point3::ORIGIN + (*s - origin) / scale)
            .collect();

        let n = k + 4;
        let mut system = DMatrix::<f64>::zeros(n, n);
        for i in 0..k {
            for j in (i + 1)..k {
                let r = local[i].distance_to(local[j]);
                system[(i, j)] = r;
                system[(j, i)] = r;
            }
            let p = local[i];
            for (col, value) in [1.0, p.x, p.y, p.z].into_iter().enumerate() {
                system[(i, k + col)] = value;
                system[(k + col, i)] = value;
            }
        }

        let mut rhs = DMatrix::<f64>::zeros(n, 3);
        for (i, t) in targets.iter().enumerate() {
            rhs[(i, 0)] = t.x;
            rhs[(i, 1)] = t.y;
            rhs[(i, 2)] = t.z;
        }

        let reciprocal_condition = reciprocal_condition(&system);
        if !(reciprocal_condition >= Tolerance::CONDITION.eps) {
            return Err(SplineError::Singular { reciprocal_condition });
        }

        let solution = system
            .lu()
            .solve(&rhs)
            .ok_or(SplineError::Singular { reciprocal_condition })?;
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(SplineError::Singular { reciprocal_condition });
        }

        let row = |r: usize| Vec3::new(solution[(r, 0)], solution[(r, 1)], solution[(r, 2)]);
        Ok(Self {
            sources: local,
            weights: (0..k).map(row).collect(),
            constant: row(k),
            linear: [row(k + 1), row(k + 2), row(k + 3)],
            origin,
            scale,
        })
    }

    #[must_use]
    pub fn landmark_count(&self) -> usize {
        self.sources.len()
    }

    /// Evaluate the warp at `p`. Cost is linear in the landmark count.
    #[must_use]
    pub fn evaluate(&self, p: Point3) -> Point3 {
        let q = Point3::ORIGIN + (p - self.origin) / self.scale;
        let mut out = self.constant
            + self.linear[0] * q.x
            + self.linear[1] * q.y
            + self.linear[2] * q.z;
        for (source, weight) in self.sources.iter().zip(&self.weights) {
            out = out + *weight * q.distance_to(*source);
        }
        Point3::ORIGIN + out
    }
}

impl DeformationField for ThinPlateSpline {
    fn apply(&self, point: Point3) -> Point3 {
        self.evaluate(point)
    }
}

/// Landmark centroid and RMS radius (1.0 when all landmarks coincide).
fn normalization(points: &[Point3]) -> (Point3, f64) {
    let mut sum = Vec3::ZERO;
    for p in points {
        sum = sum + p.to_vec3();
    }
    let origin = Point3::ORIGIN + sum / points.len() as f64;
    let mean_sq = points
        .iter()
        .map(|p| (*p - origin).length_squared())
        .sum::<f64>()
        / points.len() as f64;
    let scale = mean_sq.sqrt();
    if scale.is_finite() && scale > 0.0 {
        (origin, scale)
    } else {
        (origin, 1.0)
    }
}

fn reciprocal_condition(system: &DMatrix<f64>) -> f64 {
    let singular_values = system.clone().svd(false, false).singular_values;
    let (min, max) = singular_values
        .iter()
        .fold((f64::INFINITY, 0.0_f64), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    if max > 0.0 { min / max } else { 0.0 }
}
