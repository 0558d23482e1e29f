//! fpmrecon CLI — command-line interface for Fourier ptychographic
//! reconstruction.

use clap::{Args, Parser, Subcommand, ValueEnum};
use image::{ImageBuffer, Luma};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use fpmrecon::{
    simulate, Algorithm, ApicConfig, Dataset, EpryConfig, FrameStack, Gray16Image,
    IlluminationMode, IlluminationSelection, IlluminationSet, OpticalSystem, Reconstructor, Roi,
    RunHooks,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "fpmrecon")]
#[command(about = "Reconstruct high-resolution amplitude and phase from Fourier ptychographic captures")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct a capture set described by a JSON manifest.
    Reconstruct(CliReconstructArgs),

    /// Write a synthetic capture set and its manifest.
    Simulate(CliSimulateArgs),
}

#[derive(Debug, Clone, Args)]
struct CliReconstructArgs {
    /// Path to the dataset manifest (JSON).
    #[arg(long)]
    manifest: PathBuf,

    /// Directory for amplitude.png, phase.png, pupil_phase.png and report.json.
    #[arg(long)]
    out_dir: PathBuf,

    /// Reconstruction algorithm.
    #[arg(long, value_enum, default_value_t = AlgorithmArg::Epry)]
    algorithm: AlgorithmArg,

    /// Integer upsampling factor of the reconstruction grid.
    #[arg(long, default_value = "3")]
    upsample: usize,

    /// EPRY: initial spectrum step size.
    #[arg(long, default_value = "1.0")]
    alpha: f64,

    /// EPRY: initial pupil step size.
    #[arg(long, default_value = "0.1")]
    beta: f64,

    /// EPRY: maximum number of global iterations.
    #[arg(long, default_value = "50")]
    max_iters: usize,

    /// EPRY: co-estimate pupil aberrations.
    #[arg(long)]
    pupil_correction: bool,

    /// APIC: relative NA slack for treating an illumination as NA-matched.
    #[arg(long, default_value = "0.1")]
    match_tolerance: f64,

    /// Illumination subset to use.
    #[arg(long, value_enum, default_value_t = ModeArg::All)]
    mode: ModeArg,

    /// Angular tolerance (NA units) separating bright-field from dark-field.
    #[arg(long, default_value = "0.05")]
    tolerance: f64,

    /// ROI left column (default: centered).
    #[arg(long)]
    roi_x: Option<usize>,

    /// ROI top row (default: centered).
    #[arg(long)]
    roi_y: Option<usize>,

    /// ROI side length in pixels; frames are used whole when omitted.
    #[arg(long)]
    roi_size: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct CliSimulateArgs {
    /// Output directory for frame_NNN.png and manifest.json.
    #[arg(long)]
    out_dir: PathBuf,

    /// Frame side length in pixels.
    #[arg(long, default_value = "64")]
    size: usize,

    /// Ratio between the phantom grid and the frame grid.
    #[arg(long, default_value = "3")]
    upsample: usize,

    /// LED grid side (grid x grid illuminations).
    #[arg(long, default_value = "5")]
    grid: usize,

    /// LED spacing in NA units.
    #[arg(long, default_value = "0.05")]
    pitch_na: f64,

    /// Objective numerical aperture.
    #[arg(long, default_value = "0.1")]
    na: f64,

    /// Wavelength in micrometers.
    #[arg(long, default_value = "0.5")]
    wavelength_um: f64,

    /// Camera pixel pitch in micrometers.
    #[arg(long, default_value = "6.5")]
    camera_pixel_um: f64,

    /// System magnification.
    #[arg(long, default_value = "10.0")]
    magnification: f64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Epry,
    Apic,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    All,
    BrightField,
    DarkField,
}

impl ModeArg {
    fn to_core(self) -> IlluminationMode {
        match self {
            Self::All => IlluminationMode::All,
            Self::BrightField => IlluminationMode::BrightField,
            Self::DarkField => IlluminationMode::DarkField,
        }
    }
}

/// On-disk description of a capture set. Frame paths are relative to the
/// manifest file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    system: OpticalSystem,
    illumination: Vec<[f64; 2]>,
    frames: Vec<PathBuf>,
}

impl CliReconstructArgs {
    fn to_algorithm(&self) -> Algorithm {
        let selection = IlluminationSelection {
            mode: self.mode.to_core(),
            tolerance: self.tolerance,
        };
        match self.algorithm {
            AlgorithmArg::Epry => Algorithm::IterativeEpry(EpryConfig {
                upsample: self.upsample,
                alpha: self.alpha,
                beta: self.beta,
                max_iters: self.max_iters,
                pupil_correction: self.pupil_correction,
                selection,
            }),
            AlgorithmArg::Apic => Algorithm::ClosedFormApic(ApicConfig {
                upsample: self.upsample,
                match_tolerance: self.match_tolerance,
                selection,
            }),
        }
    }

    fn to_roi(&self, rows: usize, cols: usize) -> Option<Roi> {
        let size = self.roi_size?;
        let centered = Roi::centered(rows, cols, size);
        Some(Roi {
            x_offset: self.roi_x.unwrap_or(centered.x_offset),
            y_offset: self.roi_y.unwrap_or(centered.y_offset),
            size,
        })
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Reconstruct(args) => run_reconstruct(&args),
        Commands::Simulate(args) => run_simulate(&args),
    }
}

// ── reconstruct ────────────────────────────────────────────────────────

fn load_dataset(manifest_path: &Path) -> CliResult<Dataset> {
    let text = std::fs::read_to_string(manifest_path).map_err(|e| -> CliError {
        format!("Failed to read manifest {}: {}", manifest_path.display(), e).into()
    })?;
    let manifest: Manifest = serde_json::from_str(&text)?;
    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let mut images = Vec::with_capacity(manifest.frames.len());
    for rel in &manifest.frames {
        let path = base.join(rel);
        let img = image::open(&path).map_err(|e| -> CliError {
            format!("Failed to open frame {}: {}", path.display(), e).into()
        })?;
        images.push(img.to_luma16());
    }
    tracing::info!(
        "Loaded {} frames from {}",
        images.len(),
        manifest_path.display()
    );

    let frames = FrameStack::from_luma16(&images)?;
    let illumination = IlluminationSet::new(manifest.illumination)?;
    Ok(Dataset::new(frames, illumination, manifest.system)?)
}

fn run_reconstruct(args: &CliReconstructArgs) -> CliResult<()> {
    let mut dataset = load_dataset(&args.manifest)?;
    let (rows, cols) = dataset.frames.dims();
    tracing::info!("Frame size: {}x{}", cols, rows);

    if let Some(roi) = args.to_roi(rows, cols) {
        dataset = dataset.crop(&roi)?;
        tracing::info!(
            "Cropped to ROI x={} y={} size={}",
            roi.x_offset,
            roi.y_offset,
            roi.size
        );
    }

    let reconstructor = Reconstructor::new(args.to_algorithm());
    let mut hooks = RunHooks::new()
        .with_progress(|p| tracing::debug!("Progress {}%", p))
        .with_log(|msg| tracing::info!("{}", msg));
    let result = reconstructor.reconstruct_with_hooks(&dataset, &mut hooks)?;

    let (out_rows, out_cols) = result.dims();
    tracing::info!(
        "Reconstructed {}x{} field ({:?}, {} iterations, {} frames)",
        out_cols,
        out_rows,
        result.report.termination,
        result.report.iterations,
        result.report.frames_used.len(),
    );

    std::fs::create_dir_all(&args.out_dir)?;
    save_png(&result.amplitude_image(), &args.out_dir.join("amplitude.png"))?;
    save_png(&result.phase_image(), &args.out_dir.join("phase.png"))?;
    save_png(&result.pupil_phase_image(), &args.out_dir.join("pupil_phase.png"))?;
    let json = serde_json::to_string_pretty(&result.report)?;
    std::fs::write(args.out_dir.join("report.json"), &json)?;
    tracing::info!("Results written to {}", args.out_dir.display());

    Ok(())
}

fn save_png(img: &Gray16Image, path: &Path) -> CliResult<()> {
    img.save(path).map_err(|e| -> CliError {
        format!("Failed to write {}: {}", path.display(), e).into()
    })
}

// ── simulate ───────────────────────────────────────────────────────────

fn run_simulate(args: &CliSimulateArgs) -> CliResult<()> {
    let system = OpticalSystem {
        numerical_aperture: args.na,
        wavelength_um: args.wavelength_um,
        camera_pixel_um: args.camera_pixel_um,
        magnification: args.magnification,
    };
    let grid_size = args
        .size
        .checked_mul(args.upsample)
        .ok_or("frame size times upsample overflows")?;
    let illumination = simulate::grid_illumination(args.grid, args.pitch_na)?;
    let object = simulate::phantom(grid_size, grid_size);
    let stack = simulate::capture_stack(&object, &system, &illumination, args.upsample)?;

    let max = stack.iter().flat_map(|f| f.iter()).fold(0.0_f64, |m, &v| m.max(v));
    let scale = if max > 0.0 { u16::MAX as f64 / max } else { 0.0 };

    std::fs::create_dir_all(&args.out_dir)?;
    let mut frames = Vec::with_capacity(stack.len());
    for (i, frame) in stack.iter().enumerate() {
        let name = PathBuf::from(format!("frame_{i:03}.png"));
        save_png(&quantize(frame, scale), &args.out_dir.join(&name))?;
        frames.push(name);
    }

    let manifest = Manifest {
        system,
        illumination: illumination.directions().to_vec(),
        frames,
    };
    let manifest_path = args.out_dir.join("manifest.json");
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
    tracing::info!(
        "Wrote {} simulated {}x{} frames and {}",
        stack.len(),
        args.size,
        args.size,
        manifest_path.display()
    );
    Ok(())
}

fn quantize(frame: &DMatrix<f64>, scale: f64) -> Gray16Image {
    let (rows, cols) = frame.shape();
    ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| {
        let v = frame[(y as usize, x as usize)] * scale;
        Luma([v.round().clamp(0.0, u16::MAX as f64) as u16])
    })
}
