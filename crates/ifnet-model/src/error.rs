use thiserror::Error;

/// The error type for IFNet operations.
///
/// Every variant describes a problem with the caller's input. They are raised before
/// any tensor arithmetic runs, so a failed call never leaves partial results behind.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IfNetError {
    /// The two input frames disagree on batch size or spatial dimensions.
    #[error("Input frames differ in shape: img0 {img0:?}, img1 {img1:?}")]
    ShapeMismatch {
        /// Shape of the first frame.
        img0: [usize; 4],
        /// Shape of the second frame.
        img1: [usize; 4],
    },

    /// An input frame carries fewer than the three RGB channels.
    #[error("Input frame {index} has {channels} channels, at least 3 are required")]
    InsufficientChannels {
        /// Which frame (0 or 1) was rejected.
        index: usize,
        /// The channel count that was found.
        channels: usize,
    },

    /// A module received a tensor with the wrong channel count.
    #[error("Invalid channel count: expected {expected}, got {actual}")]
    InvalidChannels {
        /// The channel count the module was built for.
        expected: usize,
        /// The channel count that was found.
        actual: usize,
    },

    /// The scale list is malformed.
    #[error("Invalid scale list: {reason}")]
    InvalidScales {
        /// Why the scale list was rejected.
        reason: String,
    },

    /// The temporal position lies outside `[0, 1]`.
    #[error("Timestep must be a finite value in [0, 1], got {timestep}")]
    InvalidTimestep {
        /// The rejected timestep.
        timestep: f64,
    },

    /// An input tensor has a shape the network cannot process.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },

    /// The model configuration is logically inconsistent.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },
}

/// A specialized `Result` type for IFNet operations.
pub type IfNetResult<T> = Result<T, IfNetError>;
