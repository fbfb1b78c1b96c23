#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Elastic mesh augmentation.
//!
//! Produces randomized, smoothly deformed variants of a surface mesh by
//! perturbing the corners of its oriented bounding box and warping the mesh
//! with a 3D thin-plate spline. Topology, vertex order and point data are
//! preserved, so every variant stays in vertex correspondence with the base.
//!
//! ```ignore
//! use mesh_augment::{augment_mesh, AugmentOptions, io};
//!
//! let mesh = io::read_mesh("femur.vtp".as_ref())?;
//! for sample in augment_mesh(&mesh, AugmentOptions::new(0.1, 10, 42))? {
//!     io::write_mesh(format!("femur_{}.vtp", sample.index).as_ref(), &sample.mesh)?;
//! }
//! ```

pub mod augment;
pub mod geom;
pub mod io;

pub use augment::{
    AugmentConfig, AugmentError, AugmentOptions, AugmentResult, AugmentationDriver, AugmentedSample,
    augment_mesh, run_config,
};
pub use geom::{CenterMode, SurfaceMesh};
