//! Deformation fields for mesh transformations.
//!
//! A [`DeformationField`] maps any point in space to a new position. Warping
//! a mesh applies the field to every vertex independently and leaves the
//! connectivity and vertex order untouched, so the result is in one-to-one
//! vertex correspondence with the input.
//!
//! Point data follows its [`AttributeRole`]: scalar arrays are copied, vector
//! arrays are pushed through the field's Jacobian and normal arrays are
//! recomputed from the warped faces.
//!
//! # Example
//!
//! ```ignore
//! use mesh_augment::geom::{warp_mesh, LandmarkCorrespondence, ThinPlateSpline};
//!
//! let tps = ThinPlateSpline::new(&LandmarkCorrespondence::new(source, target))?;
//! let (warped, diag) = warp_mesh(&mesh, &tps)?;
//! log::debug!("{}", diag.summary());
//! ```

use super::mesh::{AttributeRole, PointDataArray, SurfaceMesh};
use super::{Point3, Vec3};

/// Relative step for the central-difference Jacobian in [`DeformationField::push_forward`].
const DIFFERENCE_STEP: f64 = 1e-6;

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur during deformation operations.
#[derive(Debug, Clone, PartialEq)]
pub enum DeformationError {
    /// The input mesh has no vertices.
    EmptyMesh,

    /// The input mesh contains NaN/Inf coordinates.
    InvalidGeometry { vertex: usize },

    /// A face references a vertex that does not exist.
    InvalidFace { face: usize },

    /// The field produced a non-finite position.
    NonFiniteResult { vertex: usize },
}

impl std::fmt::Display for DeformationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMesh => write!(f, "input mesh has no vertices"),
            Self::InvalidGeometry { vertex } => {
                write!(f, "input mesh contains invalid geometry (NaN/Inf) at vertex {vertex}")
            }
            Self::InvalidFace { face } => {
                write!(f, "face {face} references a vertex outside the mesh")
            }
            Self::NonFiniteResult { vertex } => {
                write!(f, "deformation produced a non-finite position at vertex {vertex}")
            }
        }
    }
}

impl std::error::Error for DeformationError {}

// ============================================================================
// Field trait
// ============================================================================

/// A spatial map `R³ → R³`.
pub trait DeformationField {
    fn apply(&self, point: Point3) -> Point3;

    /// Map a tangent `vector` attached at `point` through the field's Jacobian.
    ///
    /// The default takes a central difference along the vector's own
    /// direction and keeps its length scale.
    fn push_forward(&self, point: Point3, vector: Vec3) -> Vec3 {
        let len = vector.length();
        if !(len > 0.0 && len.is_finite()) {
            return vector;
        }
        let dir = vector / len;
        let h = DIFFERENCE_STEP * (1.0 + point.to_vec3().length());
        let ahead = self.apply(point + dir * h);
        let behind = self.apply(point - dir * h);
        (ahead - behind) * (len / (2.0 * h))
    }
}

/// Rigid translation; mostly useful for tests and as a trivial field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Translation(pub Vec3);

impl DeformationField for Translation {
    fn apply(&self, point: Point3) -> Point3 {
        point + self.0
    }

    fn push_forward(&self, _point: Point3, vector: Vec3) -> Vec3 {
        vector
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Diagnostics specific to deformation operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeformationDiagnostics {
    /// Number of vertices in the original mesh.
    pub original_vertex_count: usize,
    /// Number of faces in the original mesh.
    pub original_face_count: usize,
    /// Number of vertices in the result.
    pub result_vertex_count: usize,
    /// Number of faces in the result.
    pub result_face_count: usize,
    /// Minimum displacement distance applied.
    pub min_displacement: f64,
    /// Maximum displacement distance applied.
    pub max_displacement: f64,
    /// Average displacement distance applied.
    pub avg_displacement: f64,
    /// Point-data arrays that were transformed or recomputed.
    pub updated_arrays: usize,
    /// Arrays dropped or left untouched, with the reason.
    pub warnings: Vec<String>,
}

impl DeformationDiagnostics {
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "warped {} vertices / {} faces (displacement min {:.4e}, max {:.4e}, avg {:.4e}; {} arrays updated, {} warnings)",
            self.result_vertex_count,
            self.result_face_count,
            self.min_displacement,
            self.max_displacement,
            self.avg_displacement,
            self.updated_arrays,
            self.warnings.len(),
        )
    }
}

// ============================================================================
// Warp
// ============================================================================

/// Apply a deformation field to every vertex of a mesh.
///
/// # Returns
/// A tuple of the warped mesh and diagnostics.
///
/// Vector point data is pushed forward at each vertex's original position;
/// normals are recomputed on the warped faces, or dropped when the mesh has
/// no faces.
///
/// # Errors
/// Returns an error if the mesh is empty, contains invalid geometry or
/// faces, or the field sends a vertex or vector to a non-finite value.
pub fn warp_mesh<F>(
    mesh: &SurfaceMesh,
    field: &F,
) -> Result<(SurfaceMesh, DeformationDiagnostics), DeformationError>
where
    F: DeformationField + ?Sized,
{
    validate_mesh(mesh)?;

    let mut displaced_positions = Vec::with_capacity(mesh.positions.len());
    let mut displacements = Vec::with_capacity(mesh.positions.len());

    for (vertex, pos) in mesh.positions.iter().enumerate() {
        let source = Point3::from(*pos);
        let moved = field.apply(source);
        if !moved.is_finite() {
            return Err(DeformationError::NonFiniteResult { vertex });
        }
        displacements.push(moved.distance_to(source));
        displaced_positions.push(moved.to_array());
    }

    let (min_disp, max_disp, avg_disp) = compute_displacement_stats(&displacements);
    let mut result = mesh.with_positions(displaced_positions);
    let mut warnings = Vec::new();
    let mut updated_arrays = 0;

    let normals = result
        .point_data
        .iter()
        .any(|a| a.effective_role() == AttributeRole::Normals)
        .then(|| result.vertex_normals());

    let mut point_data = Vec::with_capacity(result.point_data.len());
    for array in std::mem::take(&mut result.point_data) {
        let role = array.effective_role();
        if role == AttributeRole::Scalars {
            point_data.push(array);
            continue;
        }
        if array.tuple_count() != mesh.vertex_count() || array.values.len() % 3 != 0 {
            warnings.push(format!(
                "array `{}` has {} tuples for {} vertices; copied unchanged",
                array.name,
                array.tuple_count(),
                mesh.vertex_count()
            ));
            point_data.push(array);
            continue;
        }
        match (role, &normals) {
            (AttributeRole::Normals, Some(_)) if mesh.faces.is_empty() => {
                warnings.push(format!("dropped normals `{}`: mesh has no faces", array.name));
            }
            (AttributeRole::Normals, Some(normals)) => {
                point_data.push(replace_normals(array, normals));
                updated_arrays += 1;
            }
            _ => {
                point_data.push(push_forward_array(mesh, field, array)?);
                updated_arrays += 1;
            }
        }
    }
    result.point_data = point_data;
    for warning in &warnings {
        log::warn!("{warning}");
    }

    let diagnostics = DeformationDiagnostics {
        original_vertex_count: mesh.vertex_count(),
        original_face_count: mesh.face_count(),
        result_vertex_count: result.vertex_count(),
        result_face_count: result.face_count(),
        min_displacement: min_disp,
        max_displacement: max_disp,
        avg_displacement: avg_disp,
        updated_arrays,
        warnings,
    };
    log::trace!("{}", diagnostics.summary());

    Ok((result, diagnostics))
}

// ============================================================================
// Internal helper functions
// ============================================================================

/// Validate that a mesh is non-empty and contains finite geometry.
fn validate_mesh(mesh: &SurfaceMesh) -> Result<(), DeformationError> {
    if mesh.positions.is_empty() {
        return Err(DeformationError::EmptyMesh);
    }

    for (vertex, pos) in mesh.positions.iter().enumerate() {
        if !pos[0].is_finite() || !pos[1].is_finite() || !pos[2].is_finite() {
            return Err(DeformationError::InvalidGeometry { vertex });
        }
    }

    let vertex_count = mesh.positions.len();
    if let Some(face) = mesh
        .faces
        .iter()
        .position(|f| f.iter().any(|&i| i as usize >= vertex_count))
    {
        return Err(DeformationError::InvalidFace { face });
    }

    Ok(())
}

/// Normals recomputed on the warped mesh; vertices outside every face keep their old value.
fn replace_normals(mut array: PointDataArray, normals: &[Option<Vec3>]) -> PointDataArray {
    for (tuple, normal) in array.values.chunks_exact_mut(3).zip(normals) {
        if let Some(n) = normal {
            tuple.copy_from_slice(&n.to_array());
        }
    }
    array
}

/// Vectors mapped through the field's Jacobian at the unwarped vertex positions.
fn push_forward_array<F>(
    mesh: &SurfaceMesh,
    field: &F,
    mut array: PointDataArray,
) -> Result<PointDataArray, DeformationError>
where
    F: DeformationField + ?Sized,
{
    for (vertex, (tuple, pos)) in array.values.chunks_exact_mut(3).zip(&mesh.positions).enumerate() {
        let pushed = field.push_forward(Point3::from(*pos), Vec3::new(tuple[0], tuple[1], tuple[2]));
        if !pushed.is_finite() {
            return Err(DeformationError::NonFiniteResult { vertex });
        }
        tuple.copy_from_slice(&pushed.to_array());
    }
    Ok(array)
}

/// Compute min, max, and average displacement.
fn compute_displacement_stats(displacements: &[f64]) -> (f64, f64, f64) {
    if displacements.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    let mut min_d = f64::MAX;
    let mut max_d = f64::MIN;
    let mut sum = 0.0;

    for &d in displacements {
        min_d = min_d.min(d);
        max_d = max_d.max(d);
        sum += d;
    }

    let avg = sum / displacements.len() as f64;
    (min_d, max_d, avg)
}
