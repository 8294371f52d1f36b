//! # IFNet-Burn
//!
//! A Rust implementation of the intermediate flow network (IFNet) for video frame
//! interpolation, built using the Burn deep learning framework.
//!
//! Given two frames and a temporal position between them, the network estimates a
//! bidirectional flow field and a blend mask over four coarse-to-fine stages, warps both
//! frames towards the requested position and blends them into the synthesized frame.
//!
//! ## Modules
//!
//! - `config`: per-call interpolation options and the warp mode.
//! - `error`: the error type shared by the crate.
//! - `models`: the encoder, the flow estimation stage and the interpolator.
//!
//! ## Key Components
//!
//! - `IfNet`: the model. Holds only parameters; all per-call state is local.
//! - `IfNetConfig`: drives the construction of the model.
//! - `InterpolationOptions`: timestep, scales, ensemble and warp settings of a call.
//! - `IfNetError`: the enum for all possible errors.

mod config;
mod error;
pub mod models;

#[doc(inline)]
pub use config::{InterpolationOptions, WarpMode};
#[doc(inline)]
pub use error::{IfNetError, IfNetResult};
#[doc(inline)]
pub use models::{IfNet, IfNetConfig, IfNetRecord, Interpolation, StageOutput, STAGE_COUNT};

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    pub type TestBackend = NdArray<f32>;
}
