use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use ifnet_model::{IfNet, IfNetConfig, InterpolationOptions};
use ifnet_util::{load_model, ImageUtils};

/// Inference configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// First frame.
    pub img0: PathBuf,
    /// Second frame.
    pub img1: PathBuf,
    /// Output directory.
    pub output_dir: PathBuf,
    /// Trained parameters; without them the model keeps its random initialization.
    pub weights: Option<PathBuf>,
    /// Number of frames synthesized between the two inputs.
    pub frames: usize,
    /// Resolution multiplier; `0.5` suits 4K footage. Overrides `options.scales`.
    pub resolution_scale: f64,
    /// Architecture of the model the weights belong to.
    pub model: IfNetConfig,
    /// Ensemble and warp settings. The timestep is set per output frame.
    pub options: InterpolationOptions,
}

impl InferenceConfig {
    /// Creates a configuration producing the single midpoint frame with the default model.
    pub fn new(
        img0: impl Into<PathBuf>,
        img1: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            img0: img0.into(),
            img1: img1.into(),
            output_dir: output_dir.into(),
            weights: None,
            frames: 1,
            resolution_scale: 1.0,
            model: IfNetConfig::new(),
            options: InterpolationOptions::new(),
        }
    }
}

/// Timesteps of `frames` evenly spaced intermediate frames, exclusive of both inputs.
pub fn timesteps(frames: usize) -> Vec<f64> {
    (1..=frames)
        .map(|k| k as f64 / (frames + 1) as f64)
        .collect()
}

/// Synthesizes the intermediate frames between `config.img0` and `config.img1`.
///
/// Frames are saved as `<stem of img0>_<k>.png` in the output directory, `k` counting
/// from 1, and their paths are returned in temporal order.
///
/// # Errors
///
/// Returns an error if the weights cannot be loaded, the frames cannot be read or differ
/// in size, the options are invalid, or an output cannot be written.
pub fn run_inference<B: Backend>(
    config: &InferenceConfig,
    device: &B::Device,
) -> Result<Vec<PathBuf>> {
    tracing::info!(
        img0 = %config.img0.display(),
        img1 = %config.img1.display(),
        output = %config.output_dir.display(),
        frames = config.frames,
        "running inference",
    );

    if config.frames == 0 {
        bail!("At least one intermediate frame must be requested");
    }
    let options = config
        .options
        .clone()
        .with_resolution_scale(config.resolution_scale)?;
    options.validate()?;

    let model = load(config, device)?;

    let img0 = ImageUtils::load_image::<B, _>(&config.img0, device)?;
    let img1 = ImageUtils::load_image::<B, _>(&config.img1, device)?;
    let [_, _, height, width] = img0.dims();
    if img1.dims() != img0.dims() {
        let [_, _, h1, w1] = img1.dims();
        bail!("Frames differ in size: {height}x{width} and {h1}x{w1}");
    }

    let multiple = ImageUtils::padding_multiple(config.resolution_scale);
    let img0 = ImageUtils::pad_to_multiple(img0, multiple)?;
    let img1 = ImageUtils::pad_to_multiple(img1, multiple)?;
    tracing::debug!(height, width, multiple, padded = ?img0.dims(), "padded frames");

    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output_dir.display()
        )
    })?;
    let stem = file_stem(&config.img0);

    let mut outputs = Vec::with_capacity(config.frames);
    for (index, timestep) in timesteps(config.frames).into_iter().enumerate() {
        let options = options.clone().with_timestep(timestep);
        let frame = model.forward(img0.clone(), img1.clone(), &options)?;
        let frame = ImageUtils::crop(frame, height, width)?;

        let path = config.output_dir.join(format!("{stem}_{}.png", index + 1));
        ImageUtils::save_image(frame, &path)?;
        tracing::info!(path = %path.display(), timestep, "saved frame");
        outputs.push(path);
    }

    tracing::info!("inference completed");
    Ok(outputs)
}

fn load<B: Backend>(config: &InferenceConfig, device: &B::Device) -> Result<IfNet<B>> {
    let model = config.model.init::<B>(device)?;
    match &config.weights {
        Some(path) => {
            let model = load_model(model, path, device)
                .with_context(|| format!("Failed to load weights from {}", path.display()))?;
            tracing::info!("model loaded successfully");
            Ok(model)
        }
        None => {
            tracing::warn!("no weights given, using randomly initialized parameters");
            Ok(model)
        }
    }
}

fn file_stem(path: &Path) -> &str {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("frame")
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};

    use super::*;

    type TestBackend = NdArray;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ifnet-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_frame(dir: &Path, name: &str, width: u32, height: u32, value: u8) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([value, value / 2, 255 - value]))
            .save(&path)
            .unwrap();
        path
    }

    fn small_config(img0: PathBuf, img1: PathBuf, output: PathBuf) -> InferenceConfig {
        let mut config = InferenceConfig::new(img0, img1, output);
        config.model = IfNetConfig::new().with_block_channels([8, 8, 8, 8]);
        config
    }

    #[test]
    fn timesteps_are_evenly_spaced() {
        assert_eq!(timesteps(1), vec![0.5]);
        assert_eq!(timesteps(3), vec![0.25, 0.5, 0.75]);
        assert!(timesteps(0).is_empty());
    }

    #[test]
    fn run_inference_writes_every_frame_at_input_size() {
        let dir = scratch_dir("frames");
        let img0 = write_frame(&dir, "a.png", 40, 24, 10);
        let img1 = write_frame(&dir, "b.png", 40, 24, 200);
        let mut config = small_config(img0, img1, dir.join("out"));
        config.frames = 2;

        let outputs = run_inference::<TestBackend>(&config, &Default::default()).unwrap();

        assert_eq!(
            outputs,
            vec![dir.join("out").join("a_1.png"), dir.join("out").join("a_2.png")]
        );
        for path in &outputs {
            let frame = image::open(path).unwrap();
            assert_eq!((frame.width(), frame.height()), (40, 24));
        }
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn run_inference_rejects_frames_of_different_size() {
        let dir = scratch_dir("mismatch");
        let img0 = write_frame(&dir, "a.png", 40, 24, 10);
        let img1 = write_frame(&dir, "b.png", 24, 40, 200);
        let config = small_config(img0, img1, dir.join("out"));

        let result = run_inference::<TestBackend>(&config, &Default::default());

        assert!(result.is_err());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn run_inference_requires_at_least_one_frame() {
        let mut config = small_config("a.png".into(), "b.png".into(), "out".into());
        config.frames = 0;

        assert!(run_inference::<TestBackend>(&config, &Default::default()).is_err());
    }
}
