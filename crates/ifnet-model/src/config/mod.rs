//! Configuration module for IFNet.
//!
//! - `core`: per-call interpolation options and their validation.
//! - `enums`: enumeration types selecting alternative behaviours.

mod core;
mod enums;

pub use self::core::InterpolationOptions;
pub use enums::WarpMode;
