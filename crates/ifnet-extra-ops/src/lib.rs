//! Additional operations for the Burn deep learning framework
//!
//! This crate provides operations that frame interpolation networks need but that are
//! not yet available in the core Burn framework.

mod pixel_shuffle;
mod resize;
mod warp;

// Convenient re-exports
#[doc(inline)]
pub use pixel_shuffle::{pixel_shuffle, PixelShuffle};
#[doc(inline)]
pub use resize::resize_bilinear;
#[doc(inline)]
pub use warp::backward_warp;
