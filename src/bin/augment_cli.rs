//! augment_cli - write elastically deformed variants of a surface mesh.
//!
//! Reads a JSON configuration (and/or command-line overrides), generates
//! every sample in memory and then writes `mesh_<i>.<ext>` files.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use mesh_augment::augment::{AugmentConfig, AugmentError, PreparedRun};
use mesh_augment::geom::CenterMode;
use mesh_augment::io::MeshFormat;

#[derive(Parser, Debug)]
#[command(name = "augment_cli")]
#[command(about = "Generate elastically augmented copies of a surface mesh", long_about = None)]
struct Cli {
    /// JSON configuration file
    config: Option<PathBuf>,

    /// Base mesh (.vtp or .obj); overrides `base_mesh_file`
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output directory; overrides `output_dir`
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Displacement bound as a fraction of the smallest box extent
    #[arg(short, long)]
    perturbation: Option<f64>,

    /// Number of augmented meshes to write
    #[arg(short = 'n', long)]
    count: Option<i64>,

    /// Random seed
    #[arg(short, long)]
    seed: Option<i64>,

    /// How each output mesh is recentered
    #[arg(long, value_enum)]
    center_mode: Option<CenterArg>,

    /// Output file format (defaults to the input format)
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Check inputs and list the files that would be written
    #[arg(long)]
    dry_run: bool,

    /// Log per-sample diagnostics
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CenterArg {
    AreaWeighted,
    VertexAverage,
}

impl From<CenterArg> for CenterMode {
    fn from(arg: CenterArg) -> Self {
        match arg {
            CenterArg::AreaWeighted => Self::AreaWeighted,
            CenterArg::VertexAverage => Self::VertexAverage,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Vtp,
    Obj,
}

impl From<FormatArg> for MeshFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Vtp => Self::Vtp,
            FormatArg::Obj => Self::Obj,
        }
    }
}

impl Cli {
    fn into_config(self) -> Result<AugmentConfig, AugmentError> {
        let mut config = match (&self.config, &self.input) {
            (Some(path), _) => AugmentConfig::load(path)?,
            (None, Some(input)) => AugmentConfig::new(input.clone()),
            (None, None) => {
                return Err(AugmentError::Config(
                    "pass a config file or --input <mesh>".to_owned(),
                ));
            }
        };
        if let Some(input) = self.input {
            config.base_mesh_file = input;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = Some(dir);
        }
        if let Some(fraction) = self.perturbation {
            config.control_point_perturbation = fraction;
        }
        if let Some(count) = self.count {
            config.num_perturbations = count;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(mode) = self.center_mode {
            config.center_mode = mode.into();
        }
        if let Some(format) = self.format {
            config.output_format = Some(format.into());
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(cli) {
        eprintln!("augment_cli error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), AugmentError> {
    let dry_run = cli.dry_run;
    let config = cli.into_config()?;
    let prepared = PreparedRun::prepare(&config)?;

    if dry_run {
        let driver = prepared.driver()?;
        let obb = driver.bounding_box();
        println!("base mesh:        {}", prepared.base_mesh_file.display());
        println!(
            "vertices / faces: {} / {}",
            prepared.mesh.vertex_count(),
            prepared.mesh.face_count()
        );
        println!(
            "box extents:      {:.6} {:.6} {:.6}",
            obb.size[0], obb.size[1], obb.size[2]
        );
        println!("max displacement: {:.6}", driver.max_displacement());
        println!("would write {} files:", prepared.options.sample_count);
        for path in prepared.output_paths() {
            println!("  {}", path.display());
        }
        return Ok(());
    }

    let report = prepared.execute()?;
    println!(
        "wrote {} meshes to {}",
        report.written.len(),
        report.output_dir.display()
    );
    Ok(())
}
