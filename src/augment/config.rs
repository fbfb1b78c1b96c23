//! JSON run configuration and the validated options derived from it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{AugmentError, AugmentResult};
use crate::geom::CenterMode;
use crate::io::MeshFormat;

/// Name of the directory created next to the input mesh when no output
/// directory is configured.
pub const DEFAULT_OUTPUT_SUBDIR: &str = "augmented_meshes";

fn default_perturbation() -> f64 {
    0.1
}

fn default_num_perturbations() -> i64 {
    10
}

fn default_seed() -> i64 {
    42
}

/// Run configuration as read from a JSON file.
///
/// ```json
/// {
///   "base_mesh_file": "femur.vtp",
///   "output_dir": "out",
///   "control_point_perturbation": 0.1,
///   "num_perturbations": 10,
///   "seed": 42
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentConfig {
    pub base_mesh_file: PathBuf,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Fraction of the box's smallest extent used as the displacement bound.
    #[serde(default = "default_perturbation")]
    pub control_point_perturbation: f64,
    #[serde(default = "default_num_perturbations")]
    pub num_perturbations: i64,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default)]
    pub center_mode: CenterMode,
    /// Output format; defaults to the input mesh's format.
    #[serde(default)]
    pub output_format: Option<MeshFormat>,
}

impl AugmentConfig {
    /// Configuration with every optional key at its default.
    #[must_use]
    pub fn new(base_mesh_file: impl Into<PathBuf>) -> Self {
        Self {
            base_mesh_file: base_mesh_file.into(),
            output_dir: None,
            control_point_perturbation: default_perturbation(),
            num_perturbations: default_num_perturbations(),
            seed: default_seed(),
            center_mode: CenterMode::default(),
            output_format: None,
        }
    }

    pub fn from_json_str(text: &str) -> AugmentResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a config file. Relative paths inside it stay relative to the
    /// working directory.
    pub fn load(path: &Path) -> AugmentResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| AugmentError::Config(format!("cannot read {}: {err}", path.display())))?;
        Self::from_json_str(&text)
            .map_err(|err| AugmentError::Config(format!("{}: {err}", path.display())))
    }

    /// Validated numeric options.
    pub fn options(&self) -> AugmentResult<AugmentOptions> {
        let sample_count = usize::try_from(self.num_perturbations).map_err(|_| {
            AugmentError::Config(format!(
                "num_perturbations must be non-negative, got {}",
                self.num_perturbations
            ))
        })?;
        let seed = u64::try_from(self.seed)
            .map_err(|_| AugmentError::Config(format!("seed must be non-negative, got {}", self.seed)))?;
        let options = AugmentOptions {
            perturbation_fraction: self.control_point_perturbation,
            sample_count,
            seed,
            center_mode: self.center_mode,
        };
        options.validate()?;
        Ok(options)
    }

    /// Configured output directory, or `augmented_meshes` beside the input.
    #[must_use]
    pub fn resolved_output_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => self
                .base_mesh_file
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(DEFAULT_OUTPUT_SUBDIR),
        }
    }

    /// Configured output format, or the one implied by the input extension.
    pub fn resolved_output_format(&self) -> AugmentResult<MeshFormat> {
        match self.output_format {
            Some(format) => Ok(format),
            None => MeshFormat::from_path(&self.base_mesh_file)
                .map_err(|err| AugmentError::Config(format!("cannot infer output format: {err}"))),
        }
    }
}

/// Numeric parameters of an augmentation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentOptions {
    /// Displacement bound as a fraction of the box's smallest extent.
    pub perturbation_fraction: f64,
    pub sample_count: usize,
    pub seed: u64,
    pub center_mode: CenterMode,
}

impl Default for AugmentOptions {
    fn default() -> Self {
        Self {
            perturbation_fraction: default_perturbation(),
            sample_count: 10,
            seed: 42,
            center_mode: CenterMode::default(),
        }
    }
}

impl AugmentOptions {
    #[must_use]
    pub fn new(perturbation_fraction: f64, sample_count: usize, seed: u64) -> Self {
        Self {
            perturbation_fraction,
            sample_count,
            seed,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn center_mode(mut self, mode: CenterMode) -> Self {
        self.center_mode = mode;
        self
    }

    pub fn validate(&self) -> AugmentResult<()> {
        if !self.perturbation_fraction.is_finite() || self.perturbation_fraction < 0.0 {
            return Err(AugmentError::Config(format!(
                "control_point_perturbation must be finite and non-negative, got {}",
                self.perturbation_fraction
            )));
        }
        Ok(())
    }
}

/// Zero-padding width for sample indices: the digit count of the largest
/// index, at least 1.
#[must_use]
pub fn pad_width(sample_count: usize) -> usize {
    let mut last = sample_count.saturating_sub(1);
    let mut width = 1;
    while last >= 10 {
        last /= 10;
        width += 1;
    }
    width
}

/// `mesh_<index>.<ext>` with the index zero-padded to `width`.
#[must_use]
pub fn output_file_name(index: usize, width: usize, format: MeshFormat) -> String {
    format!("mesh_{index:0width$}.{}", format.extension())
}
