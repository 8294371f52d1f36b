//! # Model Architectures
//!
//! This module aggregates the components of the intermediate flow network:
//!
//! - `encoder`: the feature encoder applied once to each input frame.
//! - `block`: one flow estimation stage.
//! - `ensemble`: helpers that fold a role-swapped estimate into the primary one.
//! - `ifnet`: the multi-scale interpolator driving four stages.
//! - `modules`: shared building blocks (conv + activation, residual unit).

pub mod block;
pub mod encoder;
pub mod ensemble;
pub mod ifnet;
pub mod modules;

pub use block::{IfBlock, IfBlockConfig, StageEstimate, RESIDUAL_DEPTH};
pub use encoder::{FeatureEncoder, FeatureEncoderConfig, FEATURE_CHANNELS};
pub use ifnet::{IfNet, IfNetConfig, IfNetRecord, Interpolation, StageOutput, STAGE_COUNT};
