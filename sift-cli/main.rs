//! sift CLI: scale-invariant keypoint detection and description.

use clap::{Args, Parser, Subcommand, ValueEnum};
use image::{Luma, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use serde::Serialize;
use sift_cli::{DetectorConfig, Sift, SiftDescriptor, SiftKeypoint};
use sift_core::{Image, Mask};
use std::path::{Path, PathBuf};
use std::time::Instant;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Detect and describe scale-invariant keypoints in grayscale images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect keypoints in an image.
    Detect(CliDetectArgs),

    /// Print a preset configuration.
    Config {
        /// Preset to print.
        #[arg(long, value_enum, default_value_t = PresetArg::Default)]
        preset: PresetArg,

        /// Output format.
        #[arg(long, value_enum, default_value_t = FormatArg::Toml)]
        format: FormatArg,
    },
}

#[derive(Debug, Clone, Args)]
struct CliDetectArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Path to write detection results (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Detection mask image; non-zero pixels are searched.
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Also compute descriptors and include them in the output.
    #[arg(long)]
    descriptors: bool,

    /// Path to write an RGBA overlay of the detected keypoints.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Detector configuration file (.toml or .json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep only the N strongest keypoints (0 = unlimited).
    #[arg(long)]
    max_features: Option<usize>,

    /// DoG contrast threshold, in [0, 1] intensity units.
    #[arg(long)]
    contrast_threshold: Option<f32>,

    /// Principal curvature ratio limit for edge rejection.
    #[arg(long)]
    edge_threshold: Option<f32>,

    /// Sampled layers per octave.
    #[arg(long)]
    octave_layers: Option<usize>,

    /// Blur of the base layer of each octave.
    #[arg(long)]
    sigma: Option<f32>,

    /// Skip the 2x input upsampling.
    #[arg(long)]
    no_upsample: bool,

    /// Worker threads (default: all cores).
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    Default,
    Fast,
    Dense,
    Robust,
}

impl PresetArg {
    fn to_config(self) -> DetectorConfig {
        match self {
            PresetArg::Default => DetectorConfig::new(),
            PresetArg::Fast => DetectorConfig::fast_preset(),
            PresetArg::Dense => DetectorConfig::dense_preset(),
            PresetArg::Robust => DetectorConfig::robust_preset(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Toml,
    Json,
}

#[derive(Serialize)]
struct DetectionReport {
    width: usize,
    height: usize,
    descriptor_size: usize,
    keypoints: Vec<SiftKeypoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    descriptors: Option<Vec<SiftDescriptor>>,
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
        Commands::Detect(args) => run_detect(&args),
        Commands::Config { preset, format } => run_config(preset, format),
    }
}

fn run_config(preset: PresetArg, format: FormatArg) -> CliResult<()> {
    let cfg = preset.to_config();
    let text = match format {
        FormatArg::Toml => cfg.to_toml()?,
        FormatArg::Json => cfg.to_json()?,
    };
    println!("{}", text);
    Ok(())
}

impl CliDetectArgs {
    fn load_config(&self) -> CliResult<DetectorConfig> {
        let mut cfg = match &self.config {
            Some(path) => match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => DetectorConfig::load_toml(path)?,
                Some("json") => DetectorConfig::load_json(path)?,
                _ => {
                    return Err(format!("unsupported config format: {} (use .toml or .json)", path.display()).into());
                }
            },
            None => DetectorConfig::new(),
        };

        let core = &mut cfg.core;
        if let Some(n) = self.max_features {
            core.max_features = n;
        }
        if let Some(t) = self.contrast_threshold {
            core.contrast_threshold = t;
        }
        if let Some(t) = self.edge_threshold {
            core.edge_threshold = t;
        }
        if let Some(n) = self.octave_layers {
            core.n_octave_layers = n;
        }
        if let Some(s) = self.sigma {
            core.sigma = s;
        }
        if self.no_upsample {
            core.upsample = false;
        }
        if let Some(n) = self.threads {
            core.n_threads = n;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn load_mask(path: &Path, width: usize, height: usize) -> CliResult<Mask> {
    let luma = image::open(path)
        .map_err(|e| -> CliError { format!("Failed to open mask {}: {}", path.display(), e).into() })?
        .to_luma8();
    let (mw, mh) = luma.dimensions();
    if (mw as usize, mh as usize) != (width, height) {
        return Err(format!("mask is {}x{} but image is {}x{}", mw, mh, width, height).into());
    }
    let data = luma.pixels().map(|Luma([v])| u8::from(*v != 0)).collect();
    Ok(Mask::new(width, height, data)?)
}

fn run_detect(args: &CliDetectArgs) -> CliResult<()> {
    tracing::info!("Loading image: {}", args.image.display());

    let luma = image::open(&args.image)
        .map_err(|e| -> CliError { format!("Failed to open image {}: {}", args.image.display(), e).into() })?
        .to_luma8();
    let (w, h) = (luma.width() as usize, luma.height() as usize);
    let img = Image::from_luma8(w, h, luma.as_raw())?;
    tracing::info!("Image size: {}x{}", w, h);

    let mask = args.mask.as_deref().map(|p| load_mask(p, w, h)).transpose()?;

    let cfg = args.load_config()?;
    tracing::info!("{}", cfg.summary());
    let sift = Sift::new(cfg.core)?;

    let t0 = Instant::now();
    let (keypoints, descriptors) = if args.descriptors {
        let (kps, desc) = sift.detect_and_compute(&img, mask.as_ref(), None, false)?;
        (kps, Some(desc))
    } else {
        (sift.detect(&img, mask.as_ref())?, None)
    };
    tracing::info!("Detected {} keypoints in {:.2?}", keypoints.len(), t0.elapsed());

    if let Some(overlay_path) = &args.overlay {
        draw_overlay(&luma, &keypoints).save(overlay_path)?;
        tracing::info!("Overlay written to {}", overlay_path.display());
    }

    let report = DetectionReport {
        width: w,
        height: h,
        descriptor_size: sift.descriptor_size(),
        keypoints,
        descriptors,
    };
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Results written to {}", args.out.display());

    Ok(())
}

/// Circles sized by keypoint scale, with a tick along the dominant orientation
fn draw_overlay(luma: &image::GrayImage, keypoints: &[SiftKeypoint]) -> RgbaImage {
    let mut output: RgbaImage = image::DynamicImage::ImageLuma8(luma.clone()).into_rgba8();
    let color = Rgba([255, 0, 0, 255]);
    for kp in keypoints {
        let radius = (kp.scale * 2.0).max(2.0);
        draw_hollow_circle_mut(&mut output, (kp.x.round() as i32, kp.y.round() as i32), radius.round() as i32, color);
        let (sin, cos) = kp.angle.to_radians().sin_cos();
        draw_line_segment_mut(&mut output, (kp.x, kp.y), (kp.x + radius * cos, kp.y + radius * sin), color);
    }
    output
}
