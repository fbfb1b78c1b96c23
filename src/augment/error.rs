use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::geom::SplineError;
use crate::io::MeshIoError;

/// Result type for the augmentation pipeline.
pub type AugmentResult<T> = Result<T, AugmentError>;

/// Pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadMesh,
    ValidateMesh,
    FitBox,
    SolveSpline,
    Warp,
    Recenter,
    WriteMesh,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadMesh => "read mesh",
            Self::ValidateMesh => "validate mesh",
            Self::FitBox => "fit bounding box",
            Self::SolveSpline => "solve thin-plate spline",
            Self::Warp => "warp mesh",
            Self::Recenter => "recenter mesh",
            Self::WriteMesh => "write mesh",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the augmentation pipeline.
#[derive(Debug, Error)]
pub enum AugmentError {
    /// The base mesh could not be read, is invalid, or has no volume.
    #[error("{stage}: {message}")]
    Input { stage: Stage, message: String },
    /// Configuration values are missing, malformed or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A sample could not be computed.
    #[error("{stage} failed for sample {sample}: {source}")]
    Numeric {
        stage: Stage,
        sample: usize,
        #[source]
        source: SplineError,
    },
    /// Warping or recentering produced unusable geometry.
    #[error("{stage} failed for sample {sample}: {message}")]
    Geometry {
        stage: Stage,
        sample: usize,
        message: String,
    },
    /// An output file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: MeshIoError,
    },
}

impl AugmentError {
    pub(crate) fn input(stage: Stage, err: impl fmt::Display) -> Self {
        Self::Input {
            stage,
            message: err.to_string(),
        }
    }

    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Input { stage, .. } | Self::Numeric { stage, .. } | Self::Geometry { stage, .. } => {
                Some(*stage)
            }
            Self::Output { .. } => Some(Stage::WriteMesh),
            Self::Config(_) => None,
        }
    }
}

impl From<serde_json::Error> for AugmentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
