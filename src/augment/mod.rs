//! Elastic augmentation of surface meshes.
//!
//! A run fits an oriented bounding box to the base mesh, takes its eight
//! corners as control points, and for every sample displaces the corners at
//! random, solves a thin-plate spline from the old corners to the new ones,
//! warps every vertex through it and moves the result back to the origin.

mod config;
mod driver;
mod error;
mod perturbation;
mod pipeline;

pub use config::{
    AugmentConfig, AugmentOptions, DEFAULT_OUTPUT_SUBDIR, output_file_name, pad_width,
};
pub use driver::{AugmentationDriver, AugmentedSample, augment_mesh};
pub use error::{AugmentError, AugmentResult, Stage};
pub use perturbation::{Perturbation, PerturbationGenerator, sample_rng};
pub use pipeline::{PreparedRun, RunReport, output_paths, run_config, write_samples};
