//! Sub-pixel rearrangement (depth-to-space).

use burn::prelude::*;

/// Rearranges `[B, C * r * r, H, W]` into `[B, C, H * r, W * r]`.
///
/// Output pixel `(h * r + i, w * r + j)` of channel `c` is read from input channel
/// `c * r * r + i * r + j` at `(h, w)`, the same ordering as `torch.nn.PixelShuffle`.
///
/// # Panics
///
/// Panics if the channel count is not divisible by `upscale_factor²`.
pub fn pixel_shuffle<B: Backend>(input: Tensor<B, 4>, upscale_factor: usize) -> Tensor<B, 4> {
    let [batch, channels, height, width] = input.dims();
    let r = upscale_factor;
    assert!(
        r > 0 && channels % (r * r) == 0,
        "pixel_shuffle: {channels} channels are not divisible by {r}²"
    );
    let out_channels = channels / (r * r);

    input
        .reshape([batch, out_channels, r, r, height, width])
        .permute([0, 1, 4, 2, 5, 3])
        .reshape([batch, out_channels, height * r, width * r])
}

/// Module wrapper around [`pixel_shuffle`] so it can sit inside a network definition.
#[derive(Module, Clone, Debug)]
pub struct PixelShuffle {
    pub upscale_factor: usize,
}

impl PixelShuffle {
    /// Create a new pixel shuffle with the given upscale factor.
    pub const fn new(upscale_factor: usize) -> Self {
        Self { upscale_factor }
    }

    /// Forward pass.
    ///
    /// # Shapes
    ///   - input: `[batch_size, channels * r * r, height, width]`
    ///   - output: `[batch_size, channels, height * r, width * r]`
    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        pixel_shuffle(input, self.upscale_factor)
    }
}
