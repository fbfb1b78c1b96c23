//! File-to-files runs: read the base mesh, augment, write every sample.

use std::fs;
use std::path::{Path, PathBuf};

use super::config::{AugmentConfig, AugmentOptions, output_file_name, pad_width};
use super::driver::{AugmentationDriver, AugmentedSample};
use super::error::{AugmentError, AugmentResult, Stage};
use crate::geom::SurfaceMesh;
use crate::io::{self, MeshFormat, MeshIoError};

/// A configuration whose options are validated and whose base mesh is loaded.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub base_mesh_file: PathBuf,
    pub mesh: SurfaceMesh,
    pub options: AugmentOptions,
    pub output_dir: PathBuf,
    pub output_format: MeshFormat,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub output_dir: PathBuf,
    /// Written files in sample order.
    pub written: Vec<PathBuf>,
    pub max_displacement: f64,
}

impl PreparedRun {
    /// Check the configuration and read the base mesh. Nothing is written.
    pub fn prepare(config: &AugmentConfig) -> AugmentResult<Self> {
        let options = config.options()?;
        let output_format = config.resolved_output_format()?;
        let mesh = io::read_mesh(&config.base_mesh_file).map_err(|err| AugmentError::Input {
            stage: Stage::ReadMesh,
            message: format!("{}: {err}", config.base_mesh_file.display()),
        })?;
        Ok(Self {
            base_mesh_file: config.base_mesh_file.clone(),
            mesh,
            options,
            output_dir: config.resolved_output_dir(),
            output_format,
        })
    }

    /// Validate the mesh and fit the control polytope.
    pub fn driver(&self) -> AugmentResult<AugmentationDriver<'_>> {
        AugmentationDriver::new(&self.mesh, self.options)
    }

    /// Paths the run will write, in sample order.
    #[must_use]
    pub fn output_paths(&self) -> Vec<PathBuf> {
        output_paths(&self.output_dir, self.options.sample_count, self.output_format)
    }

    /// Generate every sample in memory, then write them all.
    pub fn execute(&self) -> AugmentResult<RunReport> {
        let driver = self.driver()?;
        let samples = driver.run()?;
        let written = write_samples(&samples, &self.output_dir, self.output_format)?;
        log::info!(
            "wrote {} augmented meshes of {} to {}",
            written.len(),
            self.base_mesh_file.display(),
            self.output_dir.display()
        );
        Ok(RunReport {
            output_dir: self.output_dir.clone(),
            written,
            max_displacement: driver.max_displacement(),
        })
    }
}

/// Run a whole configuration.
pub fn run_config(config: &AugmentConfig) -> AugmentResult<RunReport> {
    PreparedRun::prepare(config)?.execute()
}

/// `mesh_<i>.<ext>` paths for `count` samples, padded to a common width.
#[must_use]
pub fn output_paths(dir: &Path, count: usize, format: MeshFormat) -> Vec<PathBuf> {
    let width = pad_width(count);
    (0..count)
        .map(|index| dir.join(output_file_name(index, width, format)))
        .collect()
}

/// Write samples into `dir`, creating it only when there is something to
/// write. Existing files with the same names are replaced.
pub fn write_samples(
    samples: &[AugmentedSample],
    dir: &Path,
    format: MeshFormat,
) -> AugmentResult<Vec<PathBuf>> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }
    fs::create_dir_all(dir).map_err(|err| AugmentError::Output {
        path: dir.to_path_buf(),
        source: MeshIoError::Io(err),
    })?;

    let paths = output_paths(dir, samples.len(), format);
    for (sample, path) in samples.iter().zip(&paths) {
        io::write_mesh_as(path, &sample.mesh, format).map_err(|source| AugmentError::Output {
            path: path.clone(),
            source,
        })?;
        log::debug!("wrote sample {} to {}", sample.index, path.display());
    }
    Ok(paths)
}
