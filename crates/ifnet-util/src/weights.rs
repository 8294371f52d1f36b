//! Loading and saving IFNet parameters.
//!
//! Published checkpoints are PyTorch state dicts whose keys carry a `module.` prefix from
//! `DataParallel` and index into `nn.Sequential` containers. The key remaps below map
//! them onto the field names of [`IfNetRecord`].

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{BinFileRecorder, FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::Backend,
};
use burn_import::{
    pytorch::{LoadArgs as PyTorchLoadArgs, PyTorchFileRecorder},
    safetensors::{LoadArgs as SafetensorsLoadArgs, SafetensorsFileRecorder},
};
use ifnet_model::{IfNet, IfNetRecord};
use thiserror::Error;

/// Errors that can occur while loading or saving model weights.
#[derive(Debug, Error)]
pub enum WeightError {
    /// File system errors
    #[error("file system error: {reason}")]
    FileSystemError { reason: String },

    /// Record loading errors
    #[error("failed to load model record: {reason}")]
    RecordLoadError { reason: String },

    /// Record saving errors
    #[error("failed to save model record: {reason}")]
    RecordSaveError { reason: String },

    /// Unsupported file format
    #[error("unsupported weight file format: {format}")]
    UnsupportedFormat { format: String },
}

/// Supported weight file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightFormat {
    /// PyTorch `.pt`, `.pth` or `.pkl` files
    PyTorch,
    /// SafeTensors `.safetensors` files
    SafeTensors,
    /// Burn MessagePack `.mpk` files
    MessagePack,
    /// Burn Binary `.bin` files
    Binary,
}

impl WeightFormat {
    /// Detect format from file extension.
    ///
    /// # Errors
    ///
    /// Returns `Err(WeightError::UnsupportedFormat)` for any other extension.
    pub fn from_path(path: &Path) -> Result<Self, WeightError> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("pt" | "pth" | "pkl") => Ok(Self::PyTorch),
            Some("safetensors") => Ok(Self::SafeTensors),
            Some("mpk") => Ok(Self::MessagePack),
            Some("bin") => Ok(Self::Binary),
            other => Err(WeightError::UnsupportedFormat {
                format: other.unwrap_or("<none>").to_string(),
            }),
        }
    }
}

/// Key remaps from PyTorch state-dict names to record field names.
const KEY_REMAPS: [(&str, &str); 3] = [
    ("^module\\.(.+)", "$1"),
    ("(.+)\\.conv0\\.([0-9]+)\\.0\\.(.+)", "$1.conv0.$2.conv.$3"),
    ("(.+)\\.lastconv\\.0\\.(.+)", "$1.lastconv.$2"),
];

/// Loads an [`IfNetRecord`] from `path`, picking the decoder from the file extension.
///
/// # Errors
///
/// Returns `Err(WeightError::FileSystemError)` if the file does not exist,
/// `Err(WeightError::UnsupportedFormat)` for an unknown extension and
/// `Err(WeightError::RecordLoadError)` if decoding fails.
pub fn load_record<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<IfNetRecord<B>, WeightError> {
    if !path.exists() {
        return Err(WeightError::FileSystemError {
            reason: format!("Weight file not found: {}", path.display()),
        });
    }
    let format = WeightFormat::from_path(path)?;
    tracing::info!(path = %path.display(), ?format, "loading weights");

    match format {
        WeightFormat::PyTorch => {
            let load_args = KEY_REMAPS.iter().fold(
                PyTorchLoadArgs::new(path.to_path_buf()),
                |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
            );
            PyTorchFileRecorder::<FullPrecisionSettings>::default()
                .load(load_args, device)
                .map_err(|e| WeightError::RecordLoadError {
                    reason: format!("PyTorch record loading failed: {e}"),
                })
        }
        WeightFormat::SafeTensors => {
            let load_args = KEY_REMAPS.iter().fold(
                SafetensorsLoadArgs::new(path.to_path_buf()),
                |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
            );
            SafetensorsFileRecorder::<FullPrecisionSettings>::default()
                .load(load_args, device)
                .map_err(|e| WeightError::RecordLoadError {
                    reason: format!("Safetensors record loading failed: {e}"),
                })
        }
        WeightFormat::MessagePack => NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(path.to_path_buf(), device)
            .map_err(|e| WeightError::RecordLoadError {
                reason: format!("MessagePack record loading failed: {e}"),
            }),
        WeightFormat::Binary => BinFileRecorder::<FullPrecisionSettings>::new()
            .load(path.to_path_buf(), device)
            .map_err(|e| WeightError::RecordLoadError {
                reason: format!("Binary record loading failed: {e}"),
            }),
    }
}

/// Replaces the parameters of `model` with those stored at `path`.
///
/// # Errors
///
/// See [`load_record`].
pub fn load_model<B: Backend>(
    model: IfNet<B>,
    path: &Path,
    device: &B::Device,
) -> Result<IfNet<B>, WeightError> {
    let record = load_record(path, device)?;
    Ok(model.load_record(record))
}

/// Saves `model` as a named MessagePack record and returns the written path.
///
/// The `.mpk` extension is appended by the recorder.
///
/// # Errors
///
/// Returns `Err(WeightError::RecordSaveError)` if the file cannot be written.
pub fn save_mpk<B: Backend>(model: IfNet<B>, path: &Path) -> Result<PathBuf, WeightError> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .save_file(path, &recorder)
        .map_err(|e| WeightError::RecordSaveError {
            reason: format!("MessagePack record saving failed: {e}"),
        })?;

    let written = path.with_extension("mpk");
    tracing::info!(path = %written.display(), "saved weights");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use burn::{backend::NdArray, tensor::Tensor};
    use ifnet_model::{IfNetConfig, InterpolationOptions};

    use super::*;

    type TestBackend = NdArray;

    fn small_model(device: &<TestBackend as Backend>::Device) -> IfNet<TestBackend> {
        IfNetConfig::new()
            .with_block_channels([8, 8, 8, 8])
            .init(device)
            .unwrap()
    }

    #[test]
    fn test_weight_format_detection() {
        assert_eq!(
            WeightFormat::from_path(Path::new("flownet.pkl")).unwrap(),
            WeightFormat::PyTorch
        );
        assert_eq!(
            WeightFormat::from_path(Path::new("model.pth")).unwrap(),
            WeightFormat::PyTorch
        );
        assert_eq!(
            WeightFormat::from_path(Path::new("model.safetensors")).unwrap(),
            WeightFormat::SafeTensors
        );
        assert_eq!(
            WeightFormat::from_path(Path::new("model.mpk")).unwrap(),
            WeightFormat::MessagePack
        );
        assert_eq!(
            WeightFormat::from_path(Path::new("model.bin")).unwrap(),
            WeightFormat::Binary
        );
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        assert!(matches!(
            WeightFormat::from_path(Path::new("model.onnx")),
            Err(WeightError::UnsupportedFormat { format }) if format == "onnx"
        ));
        assert!(matches!(
            WeightFormat::from_path(Path::new("model")),
            Err(WeightError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let device = Default::default();
        let result = load_record::<TestBackend>(Path::new("does/not/exist.mpk"), &device);

        assert!(matches!(result, Err(WeightError::FileSystemError { .. })));
    }

    #[test]
    fn test_saved_weights_reproduce_the_model() {
        let device = Default::default();
        let path = std::env::temp_dir().join(format!("ifnet-weights-{}", std::process::id()));
        let original = small_model(&device);
        let img0 = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device).mul_scalar(0.25);
        let img1 = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device).mul_scalar(0.75);
        let options = InterpolationOptions::new();
        let expected = original
            .forward(img0.clone(), img1.clone(), &options)
            .unwrap()
            .into_data();

        let written = save_mpk(original, &path).unwrap();
        let restored = load_model(small_model(&device), &written, &device).unwrap();
        let actual = restored.forward(img0, img1, &options).unwrap().into_data();
        std::fs::remove_file(&written).ok();

        assert_eq!(expected, actual);
    }
}
