//! Flow estimation stage.
//!
//! A stage looks at its input stack at `1 / scale` resolution, optionally together
//! with the flow accumulated so far, and predicts a flow correction, blend-mask logits
//! and a feature map for the next stage. All three come back at the resolution of the
//! input stack.

use burn::{
    nn::{
        conv::{ConvTranspose2d, ConvTranspose2dConfig},
        Initializer,
    },
    prelude::*,
};
use ifnet_extra_ops::{resize_bilinear, PixelShuffle};

use super::{
    encoder::FEATURE_CHANNELS,
    modules::{ConvLeaky, ConvLeakyConfig, ResConv, ResConvConfig},
};
use crate::error::{IfNetError, IfNetResult};

/// Number of residual units stacked inside every stage.
pub const RESIDUAL_DEPTH: usize = 8;

/// Channels of the bidirectional flow field.
pub const FLOW_CHANNELS: usize = 4;

/// Flow, mask and feature channels produced by a stage.
const OUTPUT_CHANNELS: usize = FLOW_CHANNELS + 1 + FEATURE_CHANNELS;

const SHUFFLE_FACTOR: usize = 2;

/// Largest upsampling a stage may apply to its input stack.
const MAX_UPSCALE: usize = 4;

/// Configuration for the `IfBlock` module.
#[derive(Config, Debug)]
pub struct IfBlockConfig {
    /// Channels of the input stack, including the prior flow when the stage gets one.
    in_planes: usize,
    /// Working width of the residual stack.
    #[config(default = "64")]
    channels: usize,
    #[config(default = "None")]
    initializer: Option<Initializer>,
}

impl IfBlockConfig {
    /// Initializes an `IfBlock` module.
    ///
    /// # Errors
    ///
    /// Returns `Err(IfNetError::InvalidConfiguration)` if `channels` is odd or zero.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> IfNetResult<IfBlock<B>> {
        if self.channels < 2 || self.channels % 2 != 0 {
            return Err(IfNetError::InvalidConfiguration {
                reason: format!(
                    "stage width must be a positive even number, got {}",
                    self.channels
                ),
            });
        }
        let half = self.channels / 2;

        let conv0 = vec![
            ConvLeakyConfig::new(self.in_planes, half)
                .with_stride(2)
                .with_initializer(self.initializer.clone())
                .init(device),
            ConvLeakyConfig::new(half, self.channels)
                .with_stride(2)
                .with_initializer(self.initializer.clone())
                .init(device),
        ];

        let convblock = (0..RESIDUAL_DEPTH)
            .map(|_| {
                ResConvConfig::new(self.channels)
                    .with_initializer(self.initializer.clone())
                    .init(device)
            })
            .collect();

        let mut lastconv = ConvTranspose2dConfig::new(
            [
                self.channels,
                OUTPUT_CHANNELS * SHUFFLE_FACTOR * SHUFFLE_FACTOR,
            ],
            [4, 4],
        )
        .with_stride([2, 2])
        .with_padding([1, 1]);
        if let Some(initializer) = &self.initializer {
            lastconv = lastconv.with_initializer(initializer.clone());
        }

        Ok(IfBlock {
            in_planes: self.in_planes,
            conv0,
            convblock,
            lastconv: lastconv.init(device),
            shuffle: PixelShuffle::new(SHUFFLE_FACTOR),
        })
    }
}

/// What one stage predicts, at the resolution of its input stack.
#[derive(Debug, Clone)]
pub struct StageEstimate<B: Backend> {
    /// Flow correction in pixels, `[batch, 4, height, width]`.
    pub flow: Tensor<B, 4>,
    /// Blend-mask logits, `[batch, 1, height, width]`.
    pub mask: Tensor<B, 4>,
    /// Feature map threaded into the next stage, `[batch, 8, height, width]`.
    pub feature: Tensor<B, 4>,
}

/// One coarse-to-fine flow estimation stage.
#[derive(Module, Debug)]
pub struct IfBlock<B: Backend> {
    in_planes: usize,
    pub(crate) conv0: Vec<ConvLeaky<B>>,
    pub(crate) convblock: Vec<ResConv<B>>,
    pub(crate) lastconv: ConvTranspose2d<B>,
    shuffle: PixelShuffle,
}

impl<B: Backend> IfBlock<B> {
    /// Runs the stage.
    ///
    /// # Arguments
    ///
    /// * `x` - Input stack of shape `[batch, C, height, width]`.
    /// * `flow` - Flow accumulated by earlier stages, `[batch, 4, height, width]`.
    /// * `scale` - Downsampling factor of this stage.
    ///
    /// # Errors
    ///
    /// Returns `Err(IfNetError::InvalidChannels)` if the input stack (plus the prior flow)
    /// does not match the width the stage was built for, and
    /// `Err(IfNetError::InvalidTensorShape)` if `scale` leaves no pixel to work on.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        flow: Option<Tensor<B, 4>>,
        scale: f64,
    ) -> IfNetResult<StageEstimate<B>> {
        let [_, channels, height, width] = x.dims();
        let provided = channels + flow.as_ref().map_or(0, |_| FLOW_CHANNELS);
        if provided != self.in_planes {
            return Err(IfNetError::InvalidChannels {
                expected: self.in_planes,
                actual: provided,
            });
        }
        let working = working_size(height, width, scale)?;

        let x = resize_bilinear(x, working);
        let x = match flow {
            Some(flow) => {
                let flow = resize_bilinear(flow, working).div_scalar(scale);
                Tensor::cat(vec![x, flow], 1)
            }
            None => x,
        };

        let mut feat = x;
        for conv in &self.conv0 {
            feat = conv.forward(feat);
        }
        for unit in &self.convblock {
            feat = unit.forward(feat);
        }
        let tmp = self.shuffle.forward(self.lastconv.forward(feat));
        let tmp = resize_bilinear(tmp, [height, width]);

        Ok(StageEstimate {
            flow: tmp.clone().narrow(1, 0, FLOW_CHANNELS).mul_scalar(scale),
            mask: tmp.clone().narrow(1, FLOW_CHANNELS, 1),
            feature: tmp.narrow(1, FLOW_CHANNELS + 1, FEATURE_CHANNELS),
        })
    }
}

/// Resolution a stage works at for a full-resolution `height` x `width` input.
///
/// # Errors
///
/// Returns `Err(IfNetError::InvalidTensorShape)` if either side rounds down to zero or
/// grows beyond `MAX_UPSCALE` times the input.
pub(crate) fn working_size(height: usize, width: usize, scale: f64) -> IfNetResult<[usize; 2]> {
    let h = (height as f64 / scale).floor() as usize;
    let w = (width as f64 / scale).floor() as usize;
    if h == 0 || w == 0 {
        return Err(IfNetError::InvalidTensorShape {
            expected: format!("at least {scale} pixels per side for scale {scale}"),
            actual: format!("{height}x{width}"),
        });
    }
    if h > height * MAX_UPSCALE || w > width * MAX_UPSCALE {
        return Err(IfNetError::InvalidTensorShape {
            expected: format!("a scale of at least 1/{MAX_UPSCALE}"),
            actual: format!("{h}x{w} working size for {height}x{width} at scale {scale}"),
        });
    }
    Ok([h, w])
}
