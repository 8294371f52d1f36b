//! Feature encoder applied to each input frame.
//!
//! The encoder takes a detour through half resolution: a stride-2 convolution, two
//! resolution-preserving convolutions and a stride-2 transposed convolution. For even
//! input sizes the result lines up pixel for pixel with the source frame.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        Initializer, LeakyRelu, LeakyReluConfig, PaddingConfig2d,
    },
    prelude::*,
};

use super::modules::LEAKY_SLOPE;
use crate::error::{IfNetError, IfNetResult};

/// Number of channels produced by the encoder.
pub const FEATURE_CHANNELS: usize = 8;

const INPUT_CHANNELS: usize = 3;
const HIDDEN_CHANNELS: usize = 32;

/// Configuration for the `FeatureEncoder` module.
#[derive(Config, Debug)]
pub struct FeatureEncoderConfig {
    #[config(default = "None")]
    initializer: Option<Initializer>,
}

impl FeatureEncoderConfig {
    /// Initializes a `FeatureEncoder` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> FeatureEncoder<B> {
        let conv = |in_channels: usize, stride: usize| {
            let mut config = Conv2dConfig::new([in_channels, HIDDEN_CHANNELS], [3, 3])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1));
            if let Some(initializer) = &self.initializer {
                config = config.with_initializer(initializer.clone());
            }
            config.init(device)
        };

        let mut up = ConvTranspose2dConfig::new([HIDDEN_CHANNELS, FEATURE_CHANNELS], [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1]);
        if let Some(initializer) = &self.initializer {
            up = up.with_initializer(initializer.clone());
        }

        FeatureEncoder {
            cnn0: conv(INPUT_CHANNELS, 2),
            cnn1: conv(HIDDEN_CHANNELS, 1),
            cnn2: conv(HIDDEN_CHANNELS, 1),
            cnn3: up.init(device),
            relu: LeakyReluConfig::new()
                .with_negative_slope(LEAKY_SLOPE)
                .init(),
        }
    }
}

/// Extracts an 8-channel context map from an RGB frame.
///
/// # Shapes
///   - input: `[batch_size, 3, height, width]`
///   - output: `[batch_size, 8, 2 * ceil(height / 2), 2 * ceil(width / 2)]`
#[derive(Module, Debug)]
pub struct FeatureEncoder<B: Backend> {
    cnn0: Conv2d<B>,
    cnn1: Conv2d<B>,
    cnn2: Conv2d<B>,
    cnn3: ConvTranspose2d<B>,
    relu: LeakyRelu,
}

impl<B: Backend> FeatureEncoder<B> {
    /// Encodes an RGB frame.
    ///
    /// # Errors
    ///
    /// Returns `Err(IfNetError::InvalidChannels)` unless the input has exactly 3 channels.
    pub fn forward(&self, x: Tensor<B, 4>) -> IfNetResult<Tensor<B, 4>> {
        let [.., features] = self.forward_features(x)?;
        Ok(features)
    }

    /// Encodes an RGB frame and returns the raw output of every layer.
    ///
    /// The first three maps are taken before their activation, at half resolution; the
    /// last one is the regular encoder output.
    ///
    /// # Errors
    ///
    /// Returns `Err(IfNetError::InvalidChannels)` unless the input has exactly 3 channels.
    pub fn forward_features(&self, x: Tensor<B, 4>) -> IfNetResult<[Tensor<B, 4>; 4]> {
        let [_, channels, _, _] = x.dims();
        if channels != INPUT_CHANNELS {
            return Err(IfNetError::InvalidChannels {
                expected: INPUT_CHANNELS,
                actual: channels,
            });
        }

        let x0 = self.cnn0.forward(x);
        let x1 = self.cnn1.forward(self.relu.forward(x0.clone()));
        let x2 = self.cnn2.forward(self.relu.forward(x1.clone()));
        let x3 = self.cnn3.forward(self.relu.forward(x2.clone()));

        Ok([x0, x1, x2, x3])
    }
}
