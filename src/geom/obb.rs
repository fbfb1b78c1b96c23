//! Oriented bounding box fitting and the control polytope derived from it.
//!
//! The box is fitted with principal component analysis: the covariance of
//! the point set is eigen-decomposed, the eigenvectors become the box axes,
//! and every point is projected onto them to find the tight extents. The
//! axes are then ordered by extent (largest first) so that `size[2]` is
//! always the thinnest direction of the shape.
//!
//! The eight corners of the box form the [`ControlPolytope`], the fixed set
//! of source landmarks every deformation sample is anchored to.

use nalgebra::Matrix3;

use super::{Point3, Tolerance, Vec3};

/// Errors raised while fitting an oriented bounding box.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObbError {
    #[error("cannot fit a bounding box to an empty point set")]
    EmptyInput,
    #[error("bounding box fit needs at least 4 points, got {count}")]
    TooFewPoints { count: usize },
    #[error("point {index} has non-finite coordinates")]
    NonFinitePoint { index: usize },
    #[error("point set is degenerate (coplanar, collinear or coincident); box extents {size:?}")]
    Degenerate { size: [f64; 3] },
}

/// Tight box aligned with the principal directions of a point set.
///
/// `axis_max`, `axis_mid` and `axis_min` form a right-handed orthonormal
/// frame; `size` holds the matching edge lengths in descending order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBoundingBox {
    /// Box vertex at the minimum projection along every axis.
    pub corner: Point3,
    pub axis_max: Vec3,
    pub axis_mid: Vec3,
    pub axis_min: Vec3,
    pub size: [f64; 3],
}

impl OrientedBoundingBox {
    #[must_use]
    pub const fn axes(&self) -> [Vec3; 3] {
        [self.axis_max, self.axis_mid, self.axis_min]
    }

    #[must_use]
    pub fn center(&self) -> Point3 {
        let axes = self.axes();
        let mut center = self.corner;
        for k in 0..3 {
            center = center + axes[k] * (0.5 * self.size[k]);
        }
        center
    }

    /// Edge length along the thinnest axis.
    #[must_use]
    pub const fn minor_extent(&self) -> f64 {
        self.size[2]
    }

    #[must_use]
    pub fn volume(&self) -> f64 {
        self.size[0] * self.size[1] * self.size[2]
    }

    /// Returns true if `point` lies inside the box, allowing `tol` slack.
    #[must_use]
    pub fn contains(&self, point: Point3, tol: f64) -> bool {
        let d = point - self.corner;
        self.axes()
            .iter()
            .zip(self.size)
            .all(|(axis, extent)| {
                let t = d.dot(*axis);
                t >= -tol && t <= extent + tol
            })
    }
}

/// Fit an oriented bounding box to `points`.
///
/// # Errors
/// Fails when fewer than four points are given, when any coordinate is
/// non-finite, or when the points do not span a volume.
pub fn fit_oriented_bounding_box(points: &[[f64; 3]]) -> Result<OrientedBoundingBox, ObbError> {
    if points.is_empty() {
        return Err(ObbError::EmptyInput);
    }
    if points.len() < 4 {
        return Err(ObbError::TooFewPoints { count: points.len() });
    }
    if let Some(index) = points
        .iter()
        .position(|p| !Point3::from(*p).is_finite())
    {
        return Err(ObbError::NonFinitePoint { index });
    }

    let mean = mean_point(points);
    let covariance = covariance_matrix(points, mean);
    let eigen = covariance.symmetric_eigen();

    // Stable sort: equal eigenvalues keep the solver's column order.
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    let column = |i: usize| {
        let c = eigen.eigenvectors.column(i);
        Vec3::new(c[0], c[1], c[2])
    };

    let axes = orthonormal_frame(column(order[0]), column(order[1]));

    let mut spans = axes.map(|axis| {
        let (mut t_min, mut t_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in points {
            let t = (Point3::from(*p) - mean).dot(axis);
            t_min = t_min.min(t);
            t_max = t_max.max(t);
        }
        AxisSpan { axis, t_min, t_max }
    });
    spans.sort_by(|a, b| b.extent().total_cmp(&a.extent()));

    // Reordering may have flipped handedness; flip the minor axis back.
    if spans[0].axis.cross(spans[1].axis).dot(spans[2].axis) < 0.0 {
        let s = spans[2];
        spans[2] = AxisSpan {
            axis: -s.axis,
            t_min: -s.t_max,
            t_max: -s.t_min,
        };
    }

    let size = spans.map(|s| s.extent());
    if !(size[0] > 0.0) || size[2] <= Tolerance::DEGENERATE.eps * size[0] {
        return Err(ObbError::Degenerate { size });
    }

    let mut corner = mean;
    for span in &spans {
        corner = corner + span.axis * span.t_min;
    }

    let obb = OrientedBoundingBox {
        corner,
        axis_max: spans[0].axis,
        axis_mid: spans[1].axis,
        axis_min: spans[2].axis,
        size,
    };
    log::debug!(
        "fitted OBB over {} points: size={:?} corner={:?}",
        points.len(),
        obb.size,
        obb.corner
    );
    Ok(obb)
}

#[derive(Debug, Clone, Copy)]
struct AxisSpan {
    axis: Vec3,
    t_min: f64,
    t_max: f64,
}

impl AxisSpan {
    fn extent(self) -> f64 {
        self.t_max - self.t_min
    }
}

fn mean_point(points: &[[f64; 3]]) -> Point3 {
    let mut sum = Vec3::ZERO;
    for p in points {
        sum = sum + Vec3::from(*p);
    }
    Point3::ORIGIN + sum / points.len() as f64
}

fn covariance_matrix(points: &[[f64; 3]], mean: Point3) -> Matrix3<f64> {
    let mut cov = Matrix3::zeros();
    for p in points {
        let d = Point3::from(*p) - mean;
        let d = [d.x, d.y, d.z];
        for r in 0..3 {
            for c in 0..3 {
                cov[(r, c)] += d[r] * d[c];
            }
        }
    }
    cov / points.len() as f64
}

/// Gram-Schmidt the two leading eigenvectors and complete a right-handed frame.
fn orthonormal_frame(major: Vec3, mid: Vec3) -> [Vec3; 3] {
    let major = major.normalized().unwrap_or(Vec3::X);
    let mid = (mid - major * mid.dot(major))
        .normalized()
        .unwrap_or_else(|| any_perpendicular(major));
    let minor = major.cross(mid);
    [major, mid, minor]
}

fn any_perpendicular(axis: Vec3) -> Vec3 {
    let reference = if axis.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    axis.cross(reference).normalized().unwrap_or(Vec3::Y)
}

// ============================================================================
// Control polytope
// ============================================================================

/// The eight corners of an oriented bounding box, used as source landmarks.
///
/// Corner `i` sits at `center + Σ ±size_k/2 · axis_k`, where bit 0 of `i`
/// selects the sign along the major axis, bit 1 the mid axis and bit 2 the
/// minor axis. Corner 0 is the box `corner`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlPolytope {
    points: [Point3; 8],
}

impl ControlPolytope {
    pub const CORNER_COUNT: usize = 8;

    #[must_use]
    pub fn from_box(obb: &OrientedBoundingBox) -> Self {
        let center = obb.center();
        let axes = obb.axes();
        let points = std::array::from_fn(|i| {
            let mut p = center;
            for k in 0..3 {
                let sign = if i & (1 << k) == 0 { -1.0 } else { 1.0 };
                p = p + axes[k] * (sign * 0.5 * obb.size[k]);
            }
            p
        });
        Self { points }
    }

    #[must_use]
    pub const fn points(&self) -> &[Point3; 8] {
        &self.points
    }

    /// Corners moved by one displacement each.
    #[must_use]
    pub fn displaced(&self, displacements: &[Vec3; 8]) -> [Point3; 8] {
        std::array::from_fn(|i| self.points[i] + displacements[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::mesh::test_fixtures::create_unit_cube;
    use nalgebra::{Rotation3, Vector3};

    fn box_corners(dx: f64, dy: f64, dz: f64) -> Vec<[f64; 3]> {
        let mut corners = Vec::new();
        for &z in &[0.0, dz] {
            for &y in &[0.0, dy] {
                for &x in &[0.0, dx] {
                    corners.push([x, y, z]);
                }
            }
        }
        corners
    }

    fn assert_parallel(a: Vec3, b: Vec3) {
        assert!(
            (a.dot(b).abs() - 1.0).abs() < 1e-9,
            "expected {a:?} parallel to {b:?}"
        );
    }

    #[test]
    fn test_axis_aligned_box_gives_axis_aligned_frame() {
        let obb = fit_oriented_bounding_box(&box_corners(4.0, 2.0, 1.0)).unwrap();
        assert_parallel(obb.axis_max, Vec3::X);
        assert_parallel(obb.axis_mid, Vec3::Y);
        assert_parallel(obb.axis_min, Vec3::Z);
        assert!((obb.size[0] - 4.0).abs() < 1e-9);
        assert!((obb.size[1] - 2.0).abs() < 1e-9);
        assert!((obb.size[2] - 1.0).abs() < 1e-9);
        assert!((obb.volume() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_unit_cube_is_axis_aligned_with_unit_extents() {
        let cube = create_unit_cube();
        let obb = fit_oriented_bounding_box(&cube.positions).unwrap();
        for axis in obb.axes() {
            let aligned = [Vec3::X, Vec3::Y, Vec3::Z]
                .iter()
                .any(|e| (axis.dot(*e).abs() - 1.0).abs() < 1e-9);
            assert!(aligned, "axis {axis:?} is not axis-aligned");
        }
        for extent in obb.size {
            assert!((extent - 1.0).abs() < 1e-9);
        }
        assert!(obb.center().distance_to(Point3::new(0.5, 0.5, 0.5)) < 1e-9);
    }

    #[test]
    fn test_rotated_box_recovers_rotated_frame() {
        let rotation = Rotation3::from_euler_angles(0.3, -0.7, 1.1);
        let offset = Vector3::new(5.0, -2.0, 7.5);
        let points: Vec<[f64; 3]> = box_corners(6.0, 3.0, 1.5)
            .into_iter()
            .map(|p| {
                let q = rotation * Vector3::new(p[0], p[1], p[2]) + offset;
                [q.x, q.y, q.z]
            })
            .collect();

        let obb = fit_oriented_bounding_box(&points).unwrap();
        assert_parallel(obb.axis_max, Vec3::from(rotation * Vector3::x()));
        assert_parallel(obb.axis_mid, Vec3::from(rotation * Vector3::y()));
        assert_parallel(obb.axis_min, Vec3::from(rotation * Vector3::z()));
        assert!((obb.size[0] - 6.0).abs() < 1e-9);
        assert!((obb.size[1] - 3.0).abs() < 1e-9);
        assert!((obb.size[2] - 1.5).abs() < 1e-9);
        for p in &points {
            assert!(obb.contains(Point3::from(*p), 1e-9));
        }
    }

    #[test]
    fn test_frame_is_right_handed_and_orthonormal() {
        let points = vec![
            [0.0, 0.0, 0.0],
            [3.0, 0.5, 0.1],
            [1.0, 2.0, -0.4],
            [0.2, 0.3, 1.2],
            [2.5, 2.2, 0.9],
            [-0.5, 1.1, 0.3],
        ];
        let obb = fit_oriented_bounding_box(&points).unwrap();
        let [a, b, c] = obb.axes();
        assert!(a.dot(b).abs() < 1e-12);
        assert!(b.dot(c).abs() < 1e-12);
        assert!(c.dot(a).abs() < 1e-12);
        assert!((a.cross(b).dot(c) - 1.0).abs() < 1e-12);
        assert!(obb.size[0] >= obb.size[1] && obb.size[1] >= obb.size[2]);
        for p in &points {
            assert!(obb.contains(Point3::from(*p), 1e-9));
        }
    }

    #[test]
    fn test_rejects_degenerate_inputs() {
        assert_eq!(fit_oriented_bounding_box(&[]), Err(ObbError::EmptyInput));
        assert_eq!(
            fit_oriented_bounding_box(&[[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
            Err(ObbError::TooFewPoints { count: 3 })
        );

        let coplanar = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]];
        assert!(matches!(
            fit_oriented_bounding_box(&coplanar),
            Err(ObbError::Degenerate { .. })
        ));

        let collinear = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0], [3.0, 3.0, 3.0]];
        assert!(matches!(
            fit_oriented_bounding_box(&collinear),
            Err(ObbError::Degenerate { .. })
        ));

        let coincident = [[1.0, 2.0, 3.0]; 5];
        assert!(matches!(
            fit_oriented_bounding_box(&coincident),
            Err(ObbError::Degenerate { .. })
        ));

        let mut bad = box_corners(1.0, 1.0, 1.0);
        bad[3][1] = f64::NAN;
        assert_eq!(
            fit_oriented_bounding_box(&bad),
            Err(ObbError::NonFinitePoint { index: 3 })
        );
    }

    #[test]
    fn test_polytope_matches_cube_corners() {
        let cube = create_unit_cube();
        let obb = fit_oriented_bounding_box(&cube.positions).unwrap();
        let polytope = ControlPolytope::from_box(&obb);

        assert_eq!(polytope.points().len(), ControlPolytope::CORNER_COUNT);
        assert!(polytope.points()[0].distance_to(obb.corner) < 1e-12);
        for corner in polytope.points() {
            let nearest = cube
                .positions
                .iter()
                .map(|p| corner.distance_to(Point3::from(*p)))
                .fold(f64::INFINITY, f64::min);
            assert!(nearest < 1e-9, "polytope corner {corner:?} is not a cube corner");
        }
    }

    #[test]
    fn test_polytope_is_deterministic_and_symmetric() {
        let obb = fit_oriented_bounding_box(&box_corners(4.0, 2.0, 1.0)).unwrap();
        let a = ControlPolytope::from_box(&obb);
        let b = ControlPolytope::from_box(&obb);
        assert_eq!(a, b);

        // Opposite corners (i, 7 - i) are mirrored through the center.
        let center = obb.center();
        for i in 0..8 {
            let p = a.points()[i];
            let q = a.points()[7 - i];
            let mid = Point3::new((p.x + q.x) / 2.0, (p.y + q.y) / 2.0, (p.z + q.z) / 2.0);
            assert!(mid.distance_to(center) < 1e-12);
        }
        // Corner 1 differs from corner 0 only along the major axis.
        let edge = a.points()[1] - a.points()[0];
        assert!((edge.length() - 4.0).abs() < 1e-9);
    }
}
