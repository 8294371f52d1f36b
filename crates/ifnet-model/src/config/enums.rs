//! Enumeration types for IFNet configuration.

use burn::prelude::*;

/// Selects how a source tensor is combined with the running flow field.
///
/// The combinator is used both for the encoder features handed to later stages and for
/// the images that are finally blended.
#[derive(Config, Debug, PartialEq, Eq, Hash)]
pub enum WarpMode {
    /// Bilinear backward warp with border clamping.
    ///
    /// Source 0 is sampled along flow channels 0–1, source 1 along channels 2–3.
    Resample,
    /// Elementwise exponentiation of the source by flow channels.
    ///
    /// Features use `f0 ** flow[1]` and `f1 ** flow[2]`; images use
    /// `img0 ** flow[0..3]` and `img1 ** flow[1..4]`. Negative bases with fractional
    /// exponents yield NaN and are passed through unchecked.
    Power,
}

impl Default for WarpMode {
    fn default() -> Self {
        Self::Resample
    }
}
