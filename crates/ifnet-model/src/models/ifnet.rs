//! # IFNet Model Implementation
//!
//! This module defines the multi-scale interpolator. Both frames are encoded once,
//! then four flow estimation stages run coarse to fine. Each stage refines a
//! bidirectional flow field, a blend mask and a feature map, and both frames are
//! re-warped with the updated flow. The last stage's mask blends the two warped frames
//! into the synthesized one.
//!
//! All intermediate state lives in a per-call context, so a single `IfNet` can serve
//! concurrent calls.

use burn::{nn::Initializer, prelude::*, tensor::activation::sigmoid};
use ifnet_extra_ops::backward_warp;

use super::{
    block::{working_size, IfBlock, IfBlockConfig, FLOW_CHANNELS},
    encoder::{FeatureEncoder, FeatureEncoderConfig, FEATURE_CHANNELS},
    ensemble::{merge_flow, merge_mask, swap_directions},
};
use crate::{
    config::{InterpolationOptions, WarpMode},
    error::{IfNetError, IfNetResult},
};

/// Number of cascaded flow estimation stages.
pub const STAGE_COUNT: usize = 4;

const RGB_CHANNELS: usize = 3;

/// img0, img1, f0, f1, timestep.
const FIRST_STAGE_PLANES: usize = 2 * RGB_CHANNELS + 2 * FEATURE_CHANNELS + 1;

/// First-stage planes plus mask, stage feature and prior flow.
const REFINE_STAGE_PLANES: usize = FIRST_STAGE_PLANES + 1 + FEATURE_CHANNELS + FLOW_CHANNELS;

/// Configuration for the `IfNet` model.
#[derive(Config, Debug)]
pub struct IfNetConfig {
    /// Width of the residual stack in each stage, coarse to fine.
    #[config(default = "[256, 192, 96, 48]")]
    pub block_channels: [usize; STAGE_COUNT],
    /// Overrides Burn's default initializer for every convolution.
    #[config(default = "None")]
    pub initializer: Option<Initializer>,
}

impl IfNetConfig {
    /// Initializes an `IfNet` model with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err(IfNetError::InvalidConfiguration)` if a stage width is odd or zero.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> IfNetResult<IfNet<B>> {
        let [c0, c1, c2, c3] = self.block_channels;
        let block = |in_planes: usize, channels: usize| {
            IfBlockConfig::new(in_planes)
                .with_channels(channels)
                .with_initializer(self.initializer.clone())
                .init(device)
        };

        Ok(IfNet {
            block0: block(FIRST_STAGE_PLANES, c0)?,
            block1: block(REFINE_STAGE_PLANES, c1)?,
            block2: block(REFINE_STAGE_PLANES, c2)?,
            block3: block(REFINE_STAGE_PLANES, c3)?,
            encode: FeatureEncoderConfig::new()
                .with_initializer(self.initializer.clone())
                .init(device),
        })
    }
}

/// The intermediate flow network.
#[derive(Module, Debug)]
pub struct IfNet<B: Backend> {
    block0: IfBlock<B>,
    block1: IfBlock<B>,
    block2: IfBlock<B>,
    block3: IfBlock<B>,
    encode: FeatureEncoder<B>,
}

/// Snapshot taken after a stage has updated the flow and re-warped both frames.
#[derive(Debug, Clone)]
pub struct StageOutput<B: Backend> {
    /// Accumulated flow, `[batch, 4, height, width]`.
    pub flow: Tensor<B, 4>,
    /// Mask logits, `[batch, 1, height, width]`.
    pub mask: Tensor<B, 4>,
    /// `img0` and `img1` warped by `flow`, `[batch, 3, height, width]` each.
    pub warped: [Tensor<B, 4>; 2],
}

/// Result of an interpolation call.
#[derive(Debug, Clone)]
pub struct Interpolation<B: Backend> {
    /// The synthesized frame, `[batch, 3, height, width]`.
    pub frame: Tensor<B, 4>,
    /// Blend weight of the warped `img0`, in `[0, 1]`.
    pub mask: Tensor<B, 4>,
    /// Final accumulated flow.
    pub flow: Tensor<B, 4>,
    /// One entry per stage that ran.
    pub stages: Vec<StageOutput<B>>,
}

impl<B: Backend> IfNet<B> {
    /// The four stages, coarse to fine.
    pub fn blocks(&self) -> [&IfBlock<B>; STAGE_COUNT] {
        [&self.block0, &self.block1, &self.block2, &self.block3]
    }

    /// Synthesizes the frame at `options.timestep` between `img0` and `img1`.
    ///
    /// # Arguments
    ///
    /// * `img0` - First frame, `[batch, C, height, width]` with `C >= 3`.
    /// * `img1` - Second frame, same batch and spatial size as `img0`.
    /// * `options` - Timestep, scale list, ensemble and warp settings.
    ///
    /// # Returns
    ///
    /// A `[batch, 3, height, width]` tensor.
    ///
    /// # Errors
    ///
    /// Fails before any computation if the frames disagree in shape, carry fewer than
    /// three channels, are too small for a stage scale, or if the options are invalid.
    pub fn forward(
        &self,
        img0: Tensor<B, 4>,
        img1: Tensor<B, 4>,
        options: &InterpolationOptions,
    ) -> IfNetResult<Tensor<B, 4>> {
        self.forward_detailed(img0, img1, options)
            .map(|interpolation| interpolation.frame)
    }

    /// Like [`IfNet::forward`], but also returns the mask, flow and every stage snapshot.
    ///
    /// # Errors
    ///
    /// See [`IfNet::forward`].
    pub fn forward_detailed(
        &self,
        img0: Tensor<B, 4>,
        img1: Tensor<B, 4>,
        options: &InterpolationOptions,
    ) -> IfNetResult<Interpolation<B>> {
        self.forward_partial(img0, img1, options, STAGE_COUNT)
    }

    /// Runs only the first `stages` stages and blends with the last one's mask.
    ///
    /// # Errors
    ///
    /// Returns `Err(IfNetError::InvalidConfiguration)` unless `1 <= stages <= 4`, and
    /// the errors of [`IfNet::forward`] otherwise.
    pub fn forward_partial(
        &self,
        img0: Tensor<B, 4>,
        img1: Tensor<B, 4>,
        options: &InterpolationOptions,
        stages: usize,
    ) -> IfNetResult<Interpolation<B>> {
        if !(1..=STAGE_COUNT).contains(&stages) {
            return Err(IfNetError::InvalidConfiguration {
                reason: format!("stage count must be in 1..={STAGE_COUNT}, got {stages}"),
            });
        }

        let context = CallContext::new(&self.encode, img0, img1, options)?;
        let blocks = self.blocks();
        let scales = context.scales;

        let mut state = context.initial_stage(blocks[0], scales[0])?;
        let mut outputs = Vec::with_capacity(stages);
        outputs.push(state.snapshot());

        for (stage, (block, scale)) in blocks.iter().zip(scales).enumerate().take(stages).skip(1) {
            state = context.refine_stage(stage, block, scale, state)?;
            outputs.push(state.snapshot());
        }

        Ok(blend(state, outputs))
    }
}

/// Everything a single call derives from its inputs before the stages run.
struct CallContext<B: Backend> {
    img0: Tensor<B, 4>,
    img1: Tensor<B, 4>,
    f0: Tensor<B, 4>,
    f1: Tensor<B, 4>,
    timestep: Tensor<B, 4>,
    timestep_swapped: Tensor<B, 4>,
    scales: [f64; STAGE_COUNT],
    ensemble: bool,
    warp: WarpMode,
    average_refined_mask: bool,
}

/// State threaded from one stage to the next.
struct StageState<B: Backend> {
    flow: Tensor<B, 4>,
    mask: Tensor<B, 4>,
    feature: Tensor<B, 4>,
    /// Feature chain of the role-swapped pass; present exactly when ensembling.
    feature_swapped: Option<Tensor<B, 4>>,
    warped: [Tensor<B, 4>; 2],
}

impl<B: Backend> StageState<B> {
    fn snapshot(&self) -> StageOutput<B> {
        StageOutput {
            flow: self.flow.clone(),
            mask: self.mask.clone(),
            warped: self.warped.clone(),
        }
    }
}

impl<B: Backend> CallContext<B> {
    fn new(
        encoder: &FeatureEncoder<B>,
        img0: Tensor<B, 4>,
        img1: Tensor<B, 4>,
        options: &InterpolationOptions,
    ) -> IfNetResult<Self> {
        options.validate()?;
        let scales = options.stage_scales()?;

        let shape0 = img0.dims();
        let shape1 = img1.dims();
        for (index, shape) in [shape0, shape1].iter().enumerate() {
            if shape[1] < RGB_CHANNELS {
                return Err(IfNetError::InsufficientChannels {
                    index,
                    channels: shape[1],
                });
            }
        }
        if shape0[0] != shape1[0] || shape0[2..] != shape1[2..] {
            return Err(IfNetError::ShapeMismatch {
                img0: shape0,
                img1: shape1,
            });
        }
        let [batch, _, height, width] = shape0;
        for scale in scales {
            working_size(height, width, scale)?;
        }

        let img0 = img0.narrow(1, 0, RGB_CHANNELS);
        let img1 = img1.narrow(1, 0, RGB_CHANNELS);
        // Odd sizes come back one pixel larger from the encoder.
        let f0 = crop(encoder.forward(img0.clone())?, height, width);
        let f1 = crop(encoder.forward(img1.clone())?, height, width);

        let timestep = Tensor::full([batch, 1, height, width], options.timestep, &img0.device());
        let timestep_swapped = timestep.clone().neg().add_scalar(1.0);

        Ok(Self {
            img0,
            img1,
            f0,
            f1,
            timestep,
            timestep_swapped,
            scales,
            ensemble: options.ensemble,
            warp: options.warp.clone(),
            average_refined_mask: options.average_refined_mask,
        })
    }

    fn initial_stage(&self, block: &IfBlock<B>, scale: f64) -> IfNetResult<StageState<B>> {
        let working = self.working_size(scale)?;
        tracing::debug!(
            stage = 0,
            scale,
            ?working,
            ensemble = self.ensemble,
            "estimating initial flow"
        );

        let input = Tensor::cat(
            vec![
                self.img0.clone(),
                self.img1.clone(),
                self.f0.clone(),
                self.f1.clone(),
                self.timestep.clone(),
            ],
            1,
        );
        let primary = block.forward(input, None, scale)?;
        let mut flow = primary.flow;
        let mut mask = primary.mask;
        let mut feature_swapped = None;

        if self.ensemble {
            tracing::trace!(stage = 0, "running role-swapped pass");
            let input = Tensor::cat(
                vec![
                    self.img1.clone(),
                    self.img0.clone(),
                    self.f1.clone(),
                    self.f0.clone(),
                    self.timestep_swapped.clone(),
                ],
                1,
            );
            let swapped = block.forward(input, None, scale)?;
            flow = merge_flow(flow, swapped.flow);
            mask = merge_mask(mask, swapped.mask);
            feature_swapped = Some(swapped.feature);
        }

        let warped = self.warp_images(&flow);
        Ok(StageState {
            flow,
            mask,
            feature: primary.feature,
            feature_swapped,
            warped,
        })
    }

    fn refine_stage(
        &self,
        stage: usize,
        block: &IfBlock<B>,
        scale: f64,
        state: StageState<B>,
    ) -> IfNetResult<StageState<B>> {
        let working = self.working_size(scale)?;
        tracing::debug!(
            stage,
            scale,
            ?working,
            ensemble = self.ensemble,
            "refining flow"
        );

        let StageState {
            flow,
            mask,
            feature,
            feature_swapped,
            warped: [warped0, warped1],
        } = state;
        let [wf0, wf1] = self.warp_features(&flow);

        let input = Tensor::cat(
            vec![
                warped0.clone(),
                warped1.clone(),
                wf0.clone(),
                wf1.clone(),
                self.timestep.clone(),
                mask.clone(),
                feature,
            ],
            1,
        );
        let primary = block.forward(input, Some(flow.clone()), scale)?;
        let mut flow_delta = primary.flow;
        let mut next_mask = primary.mask;
        let mut next_feature_swapped = None;

        if let Some(feature_swapped) = feature_swapped {
            tracing::trace!(stage, "running role-swapped pass");
            let input = Tensor::cat(
                vec![
                    warped1,
                    warped0,
                    wf1,
                    wf0,
                    self.timestep_swapped.clone(),
                    mask.neg(),
                    feature_swapped,
                ],
                1,
            );
            let swapped = block.forward(input, Some(swap_directions(flow.clone())), scale)?;
            flow_delta = merge_flow(flow_delta, swapped.flow);
            let averaged = merge_mask(next_mask.clone(), swapped.mask);
            if self.average_refined_mask {
                next_mask = averaged;
            }
            next_feature_swapped = Some(swapped.feature);
        }

        let flow = flow + flow_delta;
        let warped = self.warp_images(&flow);
        Ok(StageState {
            flow,
            mask: next_mask,
            feature: primary.feature,
            feature_swapped: next_feature_swapped,
            warped,
        })
    }

    fn working_size(&self, scale: f64) -> IfNetResult<[usize; 2]> {
        let [_, _, height, width] = self.timestep.dims();
        working_size(height, width, scale)
    }

    fn warp_features(&self, flow: &Tensor<B, 4>) -> [Tensor<B, 4>; 2] {
        match self.warp {
            WarpMode::Resample => [
                backward_warp(self.f0.clone(), flow.clone().narrow(1, 0, 2)),
                backward_warp(self.f1.clone(), flow.clone().narrow(1, 2, 2)),
            ],
            WarpMode::Power => [
                power(self.f0.clone(), flow.clone().narrow(1, 1, 1)),
                power(self.f1.clone(), flow.clone().narrow(1, 2, 1)),
            ],
        }
    }

    fn warp_images(&self, flow: &Tensor<B, 4>) -> [Tensor<B, 4>; 2] {
        match self.warp {
            WarpMode::Resample => [
                backward_warp(self.img0.clone(), flow.clone().narrow(1, 0, 2)),
                backward_warp(self.img1.clone(), flow.clone().narrow(1, 2, 2)),
            ],
            WarpMode::Power => [
                power(self.img0.clone(), flow.clone().narrow(1, 0, 3)),
                power(self.img1.clone(), flow.clone().narrow(1, 1, 3)),
            ],
        }
    }
}

fn blend<B: Backend>(state: StageState<B>, stages: Vec<StageOutput<B>>) -> Interpolation<B> {
    let mask = sigmoid(state.mask);
    let [warped0, warped1] = state.warped;
    let weight = mask.clone().repeat_dim(1, RGB_CHANNELS);
    let frame = warped0 * weight.clone() + warped1 * weight.neg().add_scalar(1.0);

    Interpolation {
        frame,
        mask,
        flow: state.flow,
        stages,
    }
}

/// Elementwise `base ** exponent`, broadcasting the exponent over the base's channels.
fn power<B: Backend>(base: Tensor<B, 4>, exponent: Tensor<B, 4>) -> Tensor<B, 4> {
    let shape = base.dims();
    base.powf(exponent.expand(shape))
}

fn crop<B: Backend>(x: Tensor<B, 4>, height: usize, width: usize) -> Tensor<B, 4> {
    x.narrow(2, 0, height).narrow(3, 0, width)
}
