//! Backward warping of an image by a dense displacement field.

use burn::prelude::*;

/// Samples `input` at `(x + flow_x, y + flow_y)` for every output pixel.
///
/// The flow is expressed in pixels of `input`: channel 0 is the horizontal
/// displacement, channel 1 the vertical one. Sampling is bilinear and coordinates
/// outside the image are clamped to the border, which matches
/// `grid_sample(mode="bilinear", padding_mode="border", align_corners=True)` on a
/// grid built from the same pixel offsets.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - flow: `[batch_size, 2, height, width]`
///   - output: `[batch_size, channels, height, width]`
pub fn backward_warp<B: Backend>(input: Tensor<B, 4>, flow: Tensor<B, 4>) -> Tensor<B, 4> {
    let [batch, channels, height, width] = input.dims();
    let device = input.device();
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;

    let base_x = Tensor::<B, 1, Int>::arange(0..width as i64, &device)
        .float()
        .reshape([1, 1, 1, width])
        .expand([batch, 1, height, width]);
    let base_y = Tensor::<B, 1, Int>::arange(0..height as i64, &device)
        .float()
        .reshape([1, 1, height, 1])
        .expand([batch, 1, height, width]);

    let ix = (base_x + flow.clone().narrow(1, 0, 1)).clamp(0.0, max_x);
    let iy = (base_y + flow.narrow(1, 1, 1)).clamp(0.0, max_y);

    let ix0 = ix.clone().floor();
    let iy0 = iy.clone().floor();
    let ix1 = (ix0.clone() + 1.0).clamp(0.0, max_x);
    let iy1 = (iy0.clone() + 1.0).clamp(0.0, max_y);

    let wx1 = ix - ix0.clone();
    let wy1 = iy - iy0.clone();
    let wx0 = wx1.clone().neg().add_scalar(1.0);
    let wy0 = wy1.clone().neg().add_scalar(1.0);

    let ix0 = ix0.int();
    let iy0 = iy0.int();
    let ix1 = ix1.int();
    let iy1 = iy1.int();

    let v00 = gather_pixels(&input, iy0.clone(), ix0.clone());
    let v01 = gather_pixels(&input, iy0, ix1.clone());
    let v10 = gather_pixels(&input, iy1.clone(), ix0);
    let v11 = gather_pixels(&input, iy1, ix1);

    let weight = |wy: Tensor<B, 4>, wx: Tensor<B, 4>| (wy * wx).repeat_dim(1, channels);

    v00 * weight(wy0.clone(), wx0.clone())
        + v01 * weight(wy0, wx1.clone())
        + v10 * weight(wy1.clone(), wx0)
        + v11 * weight(wy1, wx1)
}

/// Reads `input[b, c, iy, ix]` for every `(iy, ix)` pair, shared across channels.
fn gather_pixels<B: Backend>(
    input: &Tensor<B, 4>,
    iy: Tensor<B, 4, Int>,
    ix: Tensor<B, 4, Int>,
) -> Tensor<B, 4> {
    let [batch, channels, height, width] = input.dims();

    let index = (iy.mul_scalar(width as i32) + ix)
        .reshape([batch, 1, height * width])
        .repeat_dim(1, channels);

    input
        .clone()
        .reshape([batch, channels, height * width])
        .gather(2, index)
        .reshape([batch, channels, height, width])
}
