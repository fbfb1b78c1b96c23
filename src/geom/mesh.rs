use serde::{Deserialize, Serialize};

use super::{Point3, Vec3};

/// Errors raised by mesh validation and whole-mesh measurements.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("mesh has no vertices")]
    NoVertices,
    #[error("mesh has invalid vertex coordinates (NaN/Inf) at vertex {index}")]
    NonFiniteVertex { index: usize },
    #[error("face {face} references vertex {vertex} but the mesh has {vertex_count} vertices")]
    IndexOutOfBounds {
        face: usize,
        vertex: u32,
        vertex_count: usize,
    },
    #[error("face {face} has {len} vertices; polygons need at least 3")]
    ShortFace { face: usize, len: usize },
    #[error("point data array `{name}` declares zero components")]
    ZeroComponents { name: String },
    #[error("point data array `{name}` holds {tuples} tuples but the mesh has {vertex_count} vertices")]
    PointDataLength {
        name: String,
        tuples: usize,
        vertex_count: usize,
    },
}

/// How a point-data array responds to a change of vertex positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeRole {
    /// Labels and other values that do not depend on geometry. Copied as is.
    #[default]
    Scalars,
    /// Direction vectors attached to the surface. Pushed through the warp.
    Vectors,
    /// Surface normals. Recomputed from the warped faces.
    Normals,
}

/// A named per-vertex attribute array (e.g. `InsertionID` labels).
///
/// Values are stored flat, `components` values per vertex. Scalar arrays
/// ride along through every geometric operation untouched; see
/// [`AttributeRole`] for the geometric ones.
#[derive(Debug, Clone, PartialEq)]
pub struct PointDataArray {
    pub name: String,
    /// Storage type as declared by the source file (`Int64`, `Float32`, ...).
    pub data_type: String,
    pub components: usize,
    pub values: Vec<f64>,
    pub role: AttributeRole,
}

impl PointDataArray {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, components: usize, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            components: components.max(1),
            values,
            role: AttributeRole::Scalars,
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: AttributeRole) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub fn tuple_count(&self) -> usize {
        self.values.len() / self.components.max(1)
    }

    /// Role that actually applies: vector and normal handling needs three components.
    #[must_use]
    pub fn effective_role(&self) -> AttributeRole {
        if self.components == 3 { self.role } else { AttributeRole::Scalars }
    }

    /// Per-vertex 3-vectors, for arrays with three components.
    #[must_use]
    pub fn vectors(&self) -> Option<Vec<Vec3>> {
        (self.components == 3).then(|| {
            self.values
                .chunks_exact(3)
                .map(|c| Vec3::new(c[0], c[1], c[2]))
                .collect()
        })
    }

    /// Returns true when the values should be written without a fractional part.
    #[must_use]
    pub fn is_integral(&self) -> bool {
        let t = self.data_type.to_ascii_lowercase();
        t.starts_with("int") || t.starts_with("uint") || t == "idtype"
    }
}

/// Polygonal surface mesh: vertex positions, face connectivity and any
/// per-vertex attribute arrays.
///
/// Vertex order is identity: index `j` in `positions` is the same anatomical
/// vertex in every mesh derived from this one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurfaceMesh {
    pub positions: Vec<[f64; 3]>,
    pub faces: Vec<Vec<u32>>,
    pub point_data: Vec<PointDataArray>,
}

impl SurfaceMesh {
    #[must_use]
    pub fn new(positions: Vec<[f64; 3]>, faces: Vec<Vec<u32>>) -> Self {
        Self {
            positions,
            faces,
            point_data: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_point_data(mut self, array: PointDataArray) -> Self {
        self.point_data.push(array);
        self
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Number of triangles after fan-triangulating every polygon.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.faces.iter().map(|f| f.len().saturating_sub(2)).sum()
    }

    #[must_use]
    pub fn points(&self) -> Vec<Point3> {
        self.positions.iter().copied().map(Point3::from).collect()
    }

    /// Same topology and attributes, new vertex positions.
    ///
    /// `positions` must have one entry per vertex of `self`.
    #[must_use]
    pub fn with_positions(&self, positions: Vec<[f64; 3]>) -> Self {
        debug_assert_eq!(positions.len(), self.positions.len());
        Self {
            positions,
            faces: self.faces.clone(),
            point_data: self.point_data.clone(),
        }
    }

    /// Copy of the mesh translated by `offset`.
    #[must_use]
    pub fn translated(&self, offset: Vec3) -> Self {
        let positions = self
            .positions
            .iter()
            .map(|p| [p[0] + offset.x, p[1] + offset.y, p[2] + offset.z])
            .collect();
        self.with_positions(positions)
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        if self.positions.is_empty() {
            return Err(MeshError::NoVertices);
        }
        if let Some(index) = self
            .positions
            .iter()
            .position(|p| !p[0].is_finite() || !p[1].is_finite() || !p[2].is_finite())
        {
            return Err(MeshError::NonFiniteVertex { index });
        }
        let vertex_count = self.positions.len();
        for (face_idx, face) in self.faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(MeshError::ShortFace {
                    face: face_idx,
                    len: face.len(),
                });
            }
            if let Some(&vertex) = face.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(MeshError::IndexOutOfBounds {
                    face: face_idx,
                    vertex,
                    vertex_count,
                });
            }
        }
        for array in &self.point_data {
            if array.components == 0 {
                return Err(MeshError::ZeroComponents {
                    name: array.name.clone(),
                });
            }
            if array.tuple_count() != vertex_count || array.values.len() % array.components != 0 {
                return Err(MeshError::PointDataLength {
                    name: array.name.clone(),
                    tuples: array.tuple_count(),
                    vertex_count,
                });
            }
        }
        Ok(())
    }

    /// Fan triangulation of every face as vertex index triples.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.faces.iter().flat_map(|face| {
            (1..face.len().saturating_sub(1)).map(move |i| [face[0], face[i], face[i + 1]])
        })
    }

    #[must_use]
    pub fn surface_area(&self) -> f64 {
        self.triangles()
            .map(|tri| triangle_area_and_centroid(&self.positions, tri).0)
            .sum()
    }

    /// Plain mean of all vertex positions.
    #[must_use]
    pub fn vertex_centroid(&self) -> Option<Point3> {
        if self.positions.is_empty() {
            return None;
        }
        let mut sum = Vec3::ZERO;
        for p in &self.positions {
            sum = sum + Vec3::from(*p);
        }
        Some(Point3::ORIGIN + sum / self.positions.len() as f64)
    }

    /// Surface centroid: triangle centroids weighted by triangle area.
    ///
    /// Returns `None` when the mesh has no faces or zero total area.
    #[must_use]
    pub fn area_weighted_centroid(&self) -> Option<Point3> {
        let mut weighted = Vec3::ZERO;
        let mut total_area = 0.0;
        for tri in self.triangles() {
            let (area, centroid) = triangle_area_and_centroid(&self.positions, tri);
            weighted = weighted + centroid.to_vec3() * area;
            total_area += area;
        }
        if total_area > 0.0 && total_area.is_finite() {
            Some(Point3::ORIGIN + weighted / total_area)
        } else {
            None
        }
    }

    /// Area-weighted vertex normals; `None` for vertices outside every face.
    ///
    /// Indices must be valid (see [`SurfaceMesh::validate`]).
    #[must_use]
    pub fn vertex_normals(&self) -> Vec<Option<Vec3>> {
        let mut sums = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.triangles() {
            let [a, b, c] = tri.map(|i| Point3::from(self.positions[i as usize]));
            // Length is twice the triangle area.
            let normal = (b - a).cross(c - a);
            for i in tri {
                sums[i as usize] = sums[i as usize] + normal;
            }
        }
        sums.into_iter().map(Vec3::normalized).collect()
    }
}

fn triangle_area_and_centroid(positions: &[[f64; 3]], tri: [u32; 3]) -> (f64, Point3) {
    let a = Point3::from(positions[tri[0] as usize]);
    let b = Point3::from(positions[tri[1] as usize]);
    let c = Point3::from(positions[tri[2] as usize]);
    let area = 0.5 * (b - a).cross(c - a).length();
    let centroid = Point3::new(
        (a.x + b.x + c.x) / 3.0,
        (a.y + b.y + c.y) / 3.0,
        (a.z + b.z + c.z) / 3.0,
    );
    (area, centroid)
}

/// How the geometric center used for recentering is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CenterMode {
    /// Area-weighted centroid of the surface.
    #[default]
    AreaWeighted,
    /// Mean of the vertex positions.
    VertexAverage,
}

/// Result of moving a mesh so its center sits at the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Recentered {
    pub mesh: SurfaceMesh,
    /// Translation that was applied (the negated center).
    pub offset: Vec3,
}

/// Translate `mesh` so that its center (per `mode`) lands on the origin.
///
/// An area-weighted request on a mesh without surface area falls back to the
/// vertex average.
pub fn recenter_mesh(mesh: &SurfaceMesh, mode: CenterMode) -> Result<Recentered, MeshError> {
    let center = match mode {
        CenterMode::AreaWeighted => match mesh.area_weighted_centroid() {
            Some(center) => Some(center),
            None => {
                log::warn!(
                    "mesh with {} faces has no surface area; recentering on vertex average",
                    mesh.face_count()
                );
                mesh.vertex_centroid()
            }
        },
        CenterMode::VertexAverage => mesh.vertex_centroid(),
    };
    let center = center.ok_or(MeshError::NoVertices)?;
    let offset = -center.to_vec3();
    Ok(Recentered {
        mesh: mesh.translated(offset),
        offset,
    })
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::create_unit_cube;
    use super::*;

    #[test]
    fn test_cube_counts_and_area() {
        let cube = create_unit_cube();
        assert_eq!(cube.vertex_count(), 8);
        assert_eq!(cube.face_count(), 12);
        assert_eq!(cube.triangle_count(), 12);
        assert!((cube.surface_area() - 6.0).abs() < 1e-12);
        assert!(cube.validate().is_ok());
    }

    #[test]
    fn test_centroids_agree_on_symmetric_cube() {
        let cube = create_unit_cube();
        let a = cube.area_weighted_centroid().unwrap();
        let v = cube.vertex_centroid().unwrap();
        assert!(a.distance_to(Point3::new(0.5, 0.5, 0.5)) < 1e-12);
        assert!(v.distance_to(Point3::new(0.5, 0.5, 0.5)) < 1e-12);
    }

    #[test]
    fn test_area_weighting_ignores_tessellation_density() {
        // A unit square in z=0 with one extra vertex crowded near a corner.
        // The vertex average is pulled toward the crowded corner, the
        // area-weighted centroid is not.
        let positions = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.9, 0.9, 0.0],
        ];
        let faces = vec![vec![0, 1, 4], vec![1, 2, 4], vec![2, 3, 4], vec![3, 0, 4]];
        let mesh = SurfaceMesh::new(positions, faces);

        let area = mesh.area_weighted_centroid().unwrap();
        assert!(area.distance_to(Point3::new(0.5, 0.5, 0.0)) < 1e-12);

        let avg = mesh.vertex_centroid().unwrap();
        assert!((avg.x - 0.58).abs() < 1e-12);
    }

    #[test]
    fn test_recenter_moves_center_to_origin() {
        let cube = create_unit_cube().translated(Vec3::new(10.0, -4.0, 2.0));
        for mode in [CenterMode::AreaWeighted, CenterMode::VertexAverage] {
            let Recentered { mesh, offset } = recenter_mesh(&cube, mode).unwrap();
            assert!(mesh.vertex_centroid().unwrap().distance_to(Point3::ORIGIN) < 1e-12);
            assert!((offset - Vec3::new(-10.5, 3.5, -2.5)).length() < 1e-12);
            assert_eq!(mesh.faces, cube.faces);
        }
    }

    #[test]
    fn test_recenter_faceless_mesh_falls_back_to_vertex_average() {
        let mesh = SurfaceMesh::new(vec![[1.0, 0.0, 0.0], [3.0, 0.0, 0.0]], Vec::new());
        let result = recenter_mesh(&mesh, CenterMode::AreaWeighted).unwrap();
        assert_eq!(result.mesh.positions, vec![[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_recenter_empty_mesh_errors() {
        let mesh = SurfaceMesh::default();
        assert_eq!(
            recenter_mesh(&mesh, CenterMode::VertexAverage),
            Err(MeshError::NoVertices)
        );
    }

    #[test]
    fn test_validate_reports_bad_indices_and_point_data() {
        let mut cube = create_unit_cube();
        cube.faces.push(vec![0, 1, 42]);
        assert!(matches!(
            cube.validate(),
            Err(MeshError::IndexOutOfBounds { face: 12, vertex: 42, .. })
        ));

        let cube = create_unit_cube().with_point_data(PointDataArray::new(
            "InsertionID",
            "Int64",
            1,
            vec![0.0; 7],
        ));
        assert!(matches!(cube.validate(), Err(MeshError::PointDataLength { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_component_array() {
        let mut array = PointDataArray::new("Broken", "Float32", 1, vec![0.0; 8]);
        array.components = 0;
        let cube = create_unit_cube().with_point_data(array);
        assert_eq!(
            cube.validate(),
            Err(MeshError::ZeroComponents {
                name: "Broken".to_owned()
            })
        );
    }

    #[test]
    fn test_vertex_normals_point_outward_on_cube() {
        let cube = create_unit_cube();
        let normals = cube.vertex_normals();
        let center = Point3::new(0.5, 0.5, 0.5);
        for (p, n) in cube.positions.iter().zip(&normals) {
            let n = n.unwrap();
            assert!((n.length() - 1.0).abs() < 1e-12);
            assert!(n.dot(Point3::from(*p) - center) > 0.0);
        }

        let loose = SurfaceMesh::new(vec![[0.0; 3]], Vec::new());
        assert_eq!(loose.vertex_normals(), vec![None]);
    }

    #[test]
    fn test_role_needs_three_components() {
        let flat = PointDataArray::new("Normals", "Float32", 2, vec![0.0; 16]).with_role(AttributeRole::Normals);
        assert_eq!(flat.effective_role(), AttributeRole::Scalars);
        assert!(flat.vectors().is_none());

        let full = PointDataArray::new("Normals", "Float32", 3, vec![1.0, 0.0, 0.0]).with_role(AttributeRole::Normals);
        assert_eq!(full.effective_role(), AttributeRole::Normals);
        assert_eq!(full.vectors(), Some(vec![Vec3::X]));
    }

    #[test]
    fn test_translated_keeps_point_data() {
        let labels = PointDataArray::new("InsertionID", "Int64", 1, vec![0.0, 1.0, 1.0, 0.0, 2.0, 2.0, 0.0, 0.0]);
        let cube = create_unit_cube().with_point_data(labels.clone());
        let moved = cube.translated(Vec3::X);
        assert_eq!(moved.point_data, vec![labels]);
        assert_eq!(moved.positions[0], [1.0, 0.0, 0.0]);
    }
}
