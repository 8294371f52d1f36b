//! Conversion between image files and frame tensors.

use std::path::Path;

use burn::tensor::{backend::Backend, DType, Tensor, TensorData};
use image::{buffer::ConvertBuffer, DynamicImage, GenericImageView, ImageBuffer, Rgb};
use thiserror::Error;

/// Frames are padded to a multiple of this many pixels at full resolution.
const BASE_PADDING: usize = 64;

/// ImageError covers all possible errors in frame conversion operations
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to open image at '{path}': {source}")]
    ImageLoadError {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to save image to '{path}': {source}")]
    ImageSaveError {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to convert tensor to data: {reason}")]
    TensorConversionError { reason: String },

    #[error("failed to create image buffer: {reason}")]
    BufferCreationError { reason: String },

    #[error("batch size mismatch: expected 1, got {actual}")]
    InvalidBatchSize { actual: usize },

    #[error("invalid channel count: expected 3, got {actual}")]
    InvalidImageChannels { actual: usize },

    #[error("image has no pixels: {height}x{width}")]
    EmptyImage { height: usize, width: usize },

    #[error("cannot crop {height}x{width} out of {actual_height}x{actual_width}")]
    InvalidCrop {
        height: usize,
        width: usize,
        actual_height: usize,
        actual_width: usize,
    },
}

/// Result type alias for ImageError
pub type ImageResult<T> = Result<T, ImageError>;

/// Frame I/O and padding helpers.
pub struct ImageUtils;

impl ImageUtils {
    /// Load image from file and convert to tensor
    ///
    /// # Returns
    /// Tensor of shape [1, 3, height, width] with values in range [0, 1]
    pub fn load_image<B: Backend, P: AsRef<Path>>(
        path: P,
        device: &B::Device,
    ) -> ImageResult<Tensor<B, 4>> {
        let path_str = path.as_ref().display().to_string();
        let img = image::open(&path).map_err(|source| ImageError::ImageLoadError {
            path: path_str,
            source,
        })?;

        Ok(Self::dynamic_image_to_tensor(img, device))
    }

    /// Convert DynamicImage to a `[1, 3, height, width]` tensor, dropping any alpha.
    pub fn dynamic_image_to_tensor<B: Backend>(
        img: DynamicImage,
        device: &B::Device,
    ) -> Tensor<B, 4> {
        let (width, height) = img.dimensions();
        let buf = img.into_rgb32f().into_raw();

        let data = TensorData::new(buf, [height as usize, width as usize, 3]);
        Tensor::<B, 3>::from_data(data, device)
            .permute([2, 0, 1])
            .unsqueeze::<4>()
    }

    /// Convert a `[1, 3, height, width]` tensor to an RGB8 image.
    ///
    /// Values are clamped to `[0, 1]` first.
    pub fn tensor_to_dynamic_image<B: Backend>(tensor: Tensor<B, 4>) -> ImageResult<DynamicImage> {
        let [batch, channels, height, width] = tensor.dims();
        if batch != 1 {
            return Err(ImageError::InvalidBatchSize { actual: batch });
        }
        if channels != 3 {
            return Err(ImageError::InvalidImageChannels { actual: channels });
        }

        let data = tensor
            .clamp(0.0, 1.0)
            .squeeze::<3>(0)
            .permute([1, 2, 0])
            .into_data()
            .convert_dtype(DType::F32)
            .to_vec::<f32>()
            .map_err(|e| ImageError::TensorConversionError {
                reason: format!("{e:?}"),
            })?;

        let f32_buffer = ImageBuffer::<Rgb<f32>, _>::from_raw(width as u32, height as u32, data)
            .ok_or_else(|| ImageError::BufferCreationError {
                reason: "Failed to create RGB f32 image buffer".to_string(),
            })?;
        let u8_buffer: ImageBuffer<Rgb<u8>, Vec<u8>> = f32_buffer.convert();
        Ok(DynamicImage::ImageRgb8(u8_buffer))
    }

    /// Save a `[1, 3, height, width]` tensor as an image file; the format follows the
    /// extension.
    pub fn save_image<B: Backend, P: AsRef<Path>>(tensor: Tensor<B, 4>, path: P) -> ImageResult<()> {
        let img = Self::tensor_to_dynamic_image(tensor)?;
        img.save(&path).map_err(|source| ImageError::ImageSaveError {
            path: path.as_ref().display().to_string(),
            source,
        })
    }

    /// Padding granularity for a resolution multiplier: `64 / resolution_scale`, at
    /// least 64.
    pub fn padding_multiple(resolution_scale: f64) -> usize {
        let scaled = (BASE_PADDING as f64 / resolution_scale) as usize;
        scaled.max(BASE_PADDING)
    }

    /// Pads height and width up to the next multiple of `multiple` by repeating the last
    /// row and column.
    pub fn pad_to_multiple<B: Backend>(
        tensor: Tensor<B, 4>,
        multiple: usize,
    ) -> ImageResult<Tensor<B, 4>> {
        let [_, _, height, width] = tensor.dims();
        if height == 0 || width == 0 {
            return Err(ImageError::EmptyImage { height, width });
        }
        let multiple = multiple.max(1);
        let pad_h = height.div_ceil(multiple) * multiple - height;
        let pad_w = width.div_ceil(multiple) * multiple - width;

        Ok(replicate_edge(replicate_edge(tensor, 2, pad_h), 3, pad_w))
    }

    /// Crops the top-left `height` x `width` window, undoing [`ImageUtils::pad_to_multiple`].
    pub fn crop<B: Backend>(
        tensor: Tensor<B, 4>,
        height: usize,
        width: usize,
    ) -> ImageResult<Tensor<B, 4>> {
        let [_, _, actual_height, actual_width] = tensor.dims();
        if height > actual_height || width > actual_width {
            return Err(ImageError::InvalidCrop {
                height,
                width,
                actual_height,
                actual_width,
            });
        }
        Ok(tensor.narrow(2, 0, height).narrow(3, 0, width))
    }
}

fn replicate_edge<B: Backend>(tensor: Tensor<B, 4>, dim: usize, pad: usize) -> Tensor<B, 4> {
    if pad == 0 {
        return tensor;
    }
    let size = tensor.dims()[dim];
    let edge = tensor.clone().narrow(dim, size - 1, 1).repeat_dim(dim, pad);
    Tensor::cat(vec![tensor, edge], dim)
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use image::RgbImage;

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn padding_multiple_never_drops_below_base() {
        assert_eq!(ImageUtils::padding_multiple(1.0), 64);
        assert_eq!(ImageUtils::padding_multiple(0.5), 128);
        assert_eq!(ImageUtils::padding_multiple(2.0), 64);
    }

    #[test]
    fn pad_to_multiple_repeats_edges() {
        let device = Default::default();
        let data = TensorData::new(vec![1.0_f32, 2.0, 3.0, 4.0], [1, 1, 2, 2]);
        let tensor = Tensor::<TestBackend, 4>::from_data(data, &device);

        let padded = ImageUtils::pad_to_multiple(tensor, 3).unwrap();

        assert_eq!(padded.dims(), [1, 1, 3, 3]);
        assert_eq!(
            padded.into_data().to_vec::<f32>().unwrap(),
            vec![1.0, 2.0, 2.0, 3.0, 4.0, 4.0, 3.0, 4.0, 4.0]
        );
    }

    #[test]
    fn pad_then_crop_restores_frame() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::ones([1, 3, 70, 33], &device);

        let padded = ImageUtils::pad_to_multiple(tensor.clone(), 64).unwrap();
        assert_eq!(padded.dims(), [1, 3, 128, 64]);

        let cropped = ImageUtils::crop(padded, 70, 33).unwrap();
        assert_eq!(cropped.into_data(), tensor.into_data());
    }

    #[test]
    fn crop_larger_than_frame_returns_error() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::zeros([1, 3, 8, 8], &device);

        assert!(matches!(
            ImageUtils::crop(tensor, 9, 8).unwrap_err(),
            ImageError::InvalidCrop { .. }
        ));
    }

    #[test]
    fn tensor_to_image_rejects_batches_and_wrong_channels() {
        let device = Default::default();

        let batch = Tensor::<TestBackend, 4>::zeros([2, 3, 4, 4], &device);
        assert!(matches!(
            ImageUtils::tensor_to_dynamic_image(batch).unwrap_err(),
            ImageError::InvalidBatchSize { actual: 2 }
        ));

        let gray = Tensor::<TestBackend, 4>::zeros([1, 1, 4, 4], &device);
        assert!(matches!(
            ImageUtils::tensor_to_dynamic_image(gray).unwrap_err(),
            ImageError::InvalidImageChannels { actual: 1 }
        ));
    }

    #[test]
    fn image_tensor_conversion_keeps_pixel_layout() {
        let device = Default::default();
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 1, Rgb([255, 0, 51]));

        let tensor =
            ImageUtils::dynamic_image_to_tensor::<TestBackend>(DynamicImage::ImageRgb8(img), &device);
        assert_eq!(tensor.dims(), [1, 3, 2, 3]);

        let back = ImageUtils::tensor_to_dynamic_image(tensor).unwrap();
        assert_eq!(back.to_rgb8().get_pixel(2, 1), &Rgb([255, 0, 51]));
        assert_eq!(back.to_rgb8().get_pixel(0, 0), &Rgb([0, 0, 0]));
    }
}
