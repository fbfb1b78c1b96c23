//! Per-sample augmentation: perturb, solve, warp, recenter.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::config::AugmentOptions;
use super::error::{AugmentError, AugmentResult, Stage};
use super::perturbation::{PerturbationGenerator, sample_rng};
use crate::geom::{
    ControlPolytope, DeformationDiagnostics, LandmarkCorrespondence, OrientedBoundingBox, Recentered,
    SurfaceMesh, ThinPlateSpline, Vec3, fit_oriented_bounding_box, recenter_mesh, warp_mesh,
};

/// One augmented copy of the base mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedSample {
    pub index: usize,
    /// Warped and recentered mesh, same topology as the base.
    pub mesh: SurfaceMesh,
    /// Displacement applied to each control-polytope corner.
    pub displacements: [Vec3; 8],
    pub correspondence: LandmarkCorrespondence,
    /// Translation applied after warping.
    pub center_offset: Vec3,
    pub diagnostics: DeformationDiagnostics,
}

/// Generates augmented samples of one base mesh.
///
/// The box and control polytope are fitted once in [`AugmentationDriver::new`];
/// each sample then draws from its own RNG stream, so `sample(i)` returns the
/// same mesh regardless of which other samples were produced.
#[derive(Debug, Clone)]
pub struct AugmentationDriver<'a> {
    base: &'a SurfaceMesh,
    options: AugmentOptions,
    obb: OrientedBoundingBox,
    polytope: ControlPolytope,
    generator: PerturbationGenerator,
}

impl<'a> AugmentationDriver<'a> {
    /// Validate the options and the mesh, then fit the control polytope.
    ///
    /// # Errors
    /// `Config` for bad options, `Input` for an invalid mesh or a point set
    /// with no volume.
    pub fn new(base: &'a SurfaceMesh, options: AugmentOptions) -> AugmentResult<Self> {
        options.validate()?;
        base.validate()
            .map_err(|err| AugmentError::input(Stage::ValidateMesh, err))?;
        let obb = fit_oriented_bounding_box(&base.positions)
            .map_err(|err| AugmentError::input(Stage::FitBox, err))?;
        let polytope = ControlPolytope::from_box(&obb);
        let generator = PerturbationGenerator::new(options.perturbation_fraction * obb.minor_extent());

        log::info!(
            "fitted box with extents [{:.4}, {:.4}, {:.4}]; max control-point displacement {:.4}",
            obb.size[0],
            obb.size[1],
            obb.size[2],
            generator.max_magnitude()
        );

        Ok(Self {
            base,
            options,
            obb,
            polytope,
            generator,
        })
    }

    #[must_use]
    pub const fn options(&self) -> &AugmentOptions {
        &self.options
    }

    #[must_use]
    pub const fn bounding_box(&self) -> &OrientedBoundingBox {
        &self.obb
    }

    #[must_use]
    pub const fn control_polytope(&self) -> &ControlPolytope {
        &self.polytope
    }

    /// Upper bound on any control-point displacement.
    #[must_use]
    pub const fn max_displacement(&self) -> f64 {
        self.generator.max_magnitude()
    }

    /// Produce sample `index`.
    pub fn sample(&self, index: usize) -> AugmentResult<AugmentedSample> {
        let mut rng = sample_rng(self.options.seed, index);
        let displacements = self.generator.generate(&mut rng);
        let correspondence = LandmarkCorrespondence::from_displacements(&self.polytope, &displacements);

        let spline = ThinPlateSpline::new(&correspondence).map_err(|source| AugmentError::Numeric {
            stage: Stage::SolveSpline,
            sample: index,
            source,
        })?;

        let (warped, diagnostics) =
            warp_mesh(self.base, &spline).map_err(|err| AugmentError::Geometry {
                stage: Stage::Warp,
                sample: index,
                message: err.to_string(),
            })?;

        let Recentered { mesh, offset } =
            recenter_mesh(&warped, self.options.center_mode).map_err(|err| AugmentError::Geometry {
                stage: Stage::Recenter,
                sample: index,
                message: err.to_string(),
            })?;

        log::debug!("sample {index}: {}", diagnostics.summary());

        Ok(AugmentedSample {
            index,
            mesh,
            displacements,
            correspondence,
            center_offset: offset,
            diagnostics,
        })
    }

    /// Produce all `sample_count` samples in index order.
    ///
    /// Fails on the first sample that cannot be computed; no partial batch is
    /// returned.
    pub fn run(&self) -> AugmentResult<Vec<AugmentedSample>> {
        let count = self.options.sample_count;
        log::info!("generating {count} augmented samples (seed {})", self.options.seed);

        #[cfg(feature = "parallel")]
        let samples = (0..count)
            .into_par_iter()
            .map(|index| self.sample(index))
            .collect::<AugmentResult<Vec<_>>>()?;

        #[cfg(not(feature = "parallel"))]
        let samples = (0..count)
            .map(|index| self.sample(index))
            .collect::<AugmentResult<Vec<_>>>()?;

        Ok(samples)
    }
}

/// Fit, perturb and warp `mesh` `options.sample_count` times.
pub fn augment_mesh(mesh: &SurfaceMesh, options: AugmentOptions) -> AugmentResult<Vec<AugmentedSample>> {
    AugmentationDriver::new(mesh, options)?.run()
}
