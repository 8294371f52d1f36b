use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ifnet::{
    backend::{create_device, get_backend_name, SelectedBackend},
    inference::{run_inference, InferenceConfig},
    model::{IfNetConfig, InterpolationOptions, WarpMode},
    util::{load_model, save_mpk},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ifnet")]
#[command(about = "IFNet: intermediate flow estimation for video frame interpolation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize frames between two images
    Interpolate {
        /// First frame
        img0: PathBuf,

        /// Second frame
        img1: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Model weights (.pth, .pkl, .safetensors, .mpk or .bin)
        #[arg(short, long)]
        weights: PathBuf,

        /// Number of intermediate frames
        #[arg(short = 'n', long, default_value_t = 1)]
        frames: usize,

        /// Resolution multiplier, e.g. 0.5 for 4K input
        #[arg(long, default_value_t = 1.0)]
        scale: f64,

        /// Skip the role-swapped pass
        #[arg(long)]
        no_ensemble: bool,

        /// Use the elementwise power combinator instead of resampling
        #[arg(long)]
        power_warp: bool,

        /// Use the ensemble-averaged mask in refinement stages
        #[arg(long)]
        average_mask: bool,
    },

    /// Convert PyTorch or SafeTensors weights to Burn's MessagePack format
    Convert {
        /// Source weights
        input: PathBuf,

        /// Destination, the .mpk extension is appended
        output: PathBuf,
    },

    /// Show backend information
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let device = create_device();
    tracing::info!(backend = get_backend_name(), "using backend");

    match cli.command {
        Commands::Interpolate {
            img0,
            img1,
            output,
            weights,
            frames,
            scale,
            no_ensemble,
            power_warp,
            average_mask,
        } => {
            let warp = if power_warp {
                WarpMode::Power
            } else {
                WarpMode::Resample
            };
            let mut config = InferenceConfig::new(img0, img1, output);
            config.weights = Some(weights);
            config.frames = frames;
            config.resolution_scale = scale;
            config.options = InterpolationOptions::new()
                .with_ensemble(!no_ensemble)
                .with_warp(warp)
                .with_average_refined_mask(average_mask);

            run_inference::<SelectedBackend>(&config, &device)?;
            Ok(())
        }

        Commands::Convert { input, output } => {
            let model = IfNetConfig::new().init::<SelectedBackend>(&device)?;
            let model = load_model(model, &input, &device)?;
            let written = save_mpk(model, &output)?;
            println!("Saved {}", written.display());
            Ok(())
        }

        Commands::Info => {
            println!("IFNet Information:");
            println!("  Backend: {}", get_backend_name());
            println!("  Device: {device:?}");
            println!("  Stages: {}", ifnet::model::STAGE_COUNT);
            println!(
                "  Stage widths: {:?}",
                IfNetConfig::new().block_channels
            );
            Ok(())
        }
    }
}
