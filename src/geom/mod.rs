mod core;
mod deformation;
mod mesh;
mod obb;
mod tps;

pub use core::{Point3, Tolerance, Vec3};
pub use deformation::{
    DeformationDiagnostics, DeformationError, DeformationField, Translation, warp_mesh,
};
pub use mesh::{
    AttributeRole, CenterMode, MeshError, PointDataArray, Recentered, SurfaceMesh, recenter_mesh,
};
pub use obb::{ControlPolytope, ObbError, OrientedBoundingBox, fit_oriented_bounding_box};
pub use tps::{LandmarkCorrespondence, SplineError, ThinPlateSpline};

#[cfg(test)]
pub(crate) use mesh::test_fixtures;
