//! Per-call interpolation options.

use burn::prelude::*;

use super::enums::WarpMode;
use crate::{
    error::{IfNetError, IfNetResult},
    models::STAGE_COUNT,
};

/// Options for a single interpolation call.
///
/// Nothing here is stored in the model: the same parameters can serve calls with
/// different timesteps, scale lists or ensemble settings at the same time.
#[derive(Config, Debug)]
pub struct InterpolationOptions {
    /// Temporal position of the synthesized frame (0 = first frame, 1 = second frame).
    #[config(default = "0.5")]
    pub timestep: f64,
    /// Downsampling factor of each stage, coarse to fine. Exactly four positive values.
    #[config(default = "vec![8.0, 4.0, 2.0, 1.0]")]
    pub scales: Vec<f64>,
    /// Run every stage a second time with the source roles swapped and average.
    #[config(default = "true")]
    pub ensemble: bool,
    /// How sources are combined with the flow field.
    #[config(default = "WarpMode::Resample")]
    pub warp: WarpMode,
    /// Use the ensemble-averaged mask in refinement stages.
    ///
    /// When `false` the averaged mask is computed and then replaced by the
    /// primary-direction mask, matching the published checkpoints.
    #[config(default = "false")]
    pub average_refined_mask: bool,
}

impl InterpolationOptions {
    /// Derives the scale list for a resolution multiplier.
    ///
    /// A multiplier of `0.5` doubles every stage scale, which suits 4K inputs; `1.0`
    /// restores the default `[8, 4, 2, 1]`.
    ///
    /// # Errors
    ///
    /// Returns `Err(IfNetError::InvalidScales)` if `resolution_scale` is not a positive
    /// finite number.
    pub fn with_resolution_scale(self, resolution_scale: f64) -> IfNetResult<Self> {
        if !(resolution_scale.is_finite() && resolution_scale > 0.0) {
            return Err(IfNetError::InvalidScales {
                reason: format!("resolution scale must be positive, got {resolution_scale}"),
            });
        }
        let scales = [8.0, 4.0, 2.0, 1.0]
            .iter()
            .map(|s| s / resolution_scale)
            .collect();
        Ok(self.with_scales(scales))
    }

    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns `Err(IfNetError::InvalidTimestep)` if the timestep is outside `[0, 1]`.
    /// Returns `Err(IfNetError::InvalidScales)` if the scale list does not hold exactly
    /// four positive finite values.
    pub fn validate(&self) -> IfNetResult<()> {
        if !(self.timestep.is_finite() && (0.0..=1.0).contains(&self.timestep)) {
            return Err(IfNetError::InvalidTimestep {
                timestep: self.timestep,
            });
        }
        self.stage_scales().map(|_| ())
    }

    /// Returns the validated scale list as a fixed-size array.
    ///
    /// # Errors
    ///
    /// Returns `Err(IfNetError::InvalidScales)` on a malformed list.
    pub fn stage_scales(&self) -> IfNetResult<[f64; STAGE_COUNT]> {
        let scales: [f64; STAGE_COUNT] =
            self.scales
                .as_slice()
                .try_into()
                .map_err(|_| IfNetError::InvalidScales {
                    reason: format!(
                        "expected {STAGE_COUNT} scales, got {}",
                        self.scales.len()
                    ),
                })?;

        if let Some(bad) = scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(IfNetError::InvalidScales {
                reason: format!("scales must be positive and finite, got {bad}"),
            });
        }
        Ok(scales)
    }
}
