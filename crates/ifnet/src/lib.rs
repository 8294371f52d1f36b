//! `IFNet`: intermediate flow estimation for video frame interpolation.
//!
//! This crate ties the model and its utilities into an inference harness and a
//! command-line tool, running on the backend selected by cargo features.

pub mod backend;
pub mod inference;

#[doc(inline)]
pub use ifnet_model as model;
#[doc(inline)]
pub use ifnet_util as util;
