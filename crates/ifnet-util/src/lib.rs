//! Utilities around the IFNet model: loading trained parameters from the formats they
//! are distributed in, and moving frames between image files and tensors.

pub mod image;
pub mod weights;

pub use image::{ImageError, ImageResult, ImageUtils};
pub use weights::{load_model, load_record, save_mpk, WeightError, WeightFormat};
