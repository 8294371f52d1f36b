//! Bilinear resizing with half-pixel sampling.

use burn::{prelude::*, tensor::TensorData};

/// Resizes the two spatial dimensions of `input` to `size` with bilinear sampling.
///
/// Output pixel `dst` samples source coordinate `(dst + 0.5) * in / out - 0.5`,
/// clamped to `[0, in - 1]`, the mapping of
/// `F.interpolate(mode="bilinear", align_corners=False)`. Source indices are computed
/// on the host and never leave the input, whatever the ratio between the sizes.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, size[0], size[1]]`
///
/// # Panics
///
/// Panics if the input or the requested size has a zero side.
pub fn resize_bilinear<B: Backend>(input: Tensor<B, 4>, size: [usize; 2]) -> Tensor<B, 4> {
    let [_, _, height, width] = input.dims();
    let [out_height, out_width] = size;
    assert!(
        height > 0 && width > 0 && out_height > 0 && out_width > 0,
        "resize_bilinear: cannot resize {height}x{width} to {out_height}x{out_width}"
    );

    let rows = resize_axis(input, 2, height, out_height);
    resize_axis(rows, 3, width, out_width)
}

/// Source taps of every output position along one axis.
struct AxisTaps {
    lower: Vec<i64>,
    upper: Vec<i64>,
    weight: Vec<f32>,
}

impl AxisTaps {
    fn new(in_size: usize, out_size: usize) -> Self {
        let ratio = in_size as f64 / out_size as f64;
        let last = in_size - 1;
        let mut taps = Self {
            lower: Vec::with_capacity(out_size),
            upper: Vec::with_capacity(out_size),
            weight: Vec::with_capacity(out_size),
        };

        for dst in 0..out_size {
            let src = ((dst as f64 + 0.5) * ratio - 0.5).max(0.0);
            let lower = (src.floor() as usize).min(last);
            let upper = (lower + 1).min(last);
            taps.lower.push(lower as i64);
            taps.upper.push(upper as i64);
            taps.weight.push((src - lower as f64).min(1.0) as f32);
        }
        taps
    }
}

fn resize_axis<B: Backend>(
    input: Tensor<B, 4>,
    dim: usize,
    in_size: usize,
    out_size: usize,
) -> Tensor<B, 4> {
    if in_size == out_size {
        return input;
    }
    let device = input.device();
    let taps = AxisTaps::new(in_size, out_size);

    let index = |values: Vec<i64>| {
        Tensor::<B, 1, Int>::from_data(TensorData::new(values, [out_size]), &device)
    };
    let lower = input.clone().select(dim, index(taps.lower));
    let upper = input.select(dim, index(taps.upper));

    let mut shape = [1; 4];
    shape[dim] = out_size;
    let weight = Tensor::<B, 1>::from_data(TensorData::new(taps.weight, [out_size]), &device)
        .reshape(shape)
        .expand(lower.dims());

    lower.clone() + (upper - lower) * weight
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;

    use super::*;
    use crate::tests::TestBackend;

    fn row(values: Vec<f32>) -> Tensor<TestBackend, 4> {
        let width = values.len();
        Tensor::from_data(TensorData::new(values, [1, 1, 1, width]), &Default::default())
    }

    fn values(tensor: Tensor<TestBackend, 4>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-6, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn downsampling_samples_pixel_centres() {
        let output = resize_bilinear(row(vec![0.0, 1.0, 2.0, 3.0]), [1, 2]);

        assert_close(&values(output), &[0.5, 2.5]);
    }

    #[test]
    fn upsampling_clamps_at_the_borders() {
        let output = resize_bilinear(row(vec![0.0, 1.0]), [1, 4]);

        assert_close(&values(output), &[0.0, 0.25, 0.75, 1.0]);
    }

    #[test]
    fn both_axes_are_resampled() {
        let device = Default::default();
        // 2x2 image whose value is 10 * y + x.
        let input = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![0.0_f32, 1.0, 10.0, 11.0], [1, 1, 2, 2]),
            &device,
        );

        let output = resize_bilinear(input, [4, 1]);

        assert_eq!(output.dims(), [1, 1, 4, 1]);
        assert_close(&values(output), &[0.5, 3.0, 8.0, 10.5]);
    }

    #[test]
    fn same_size_is_identity() {
        let device = Default::default();
        let input =
            Tensor::<TestBackend, 4>::random([2, 3, 5, 7], Distribution::Default, &device);

        let output = resize_bilinear(input.clone(), [5, 7]);

        assert_eq!(values(output), values(input));
    }

    #[test]
    fn stage_sized_round_trips_stay_in_bounds() {
        let device = Default::default();
        for ([height, width], scale) in [([32, 48], 2), ([32, 48], 8), ([768, 1280], 8)] {
            let input = Tensor::<TestBackend, 4>::ones([1, 1, height, width], &device);

            let down = resize_bilinear(input, [height / scale, width / scale]);
            let up = resize_bilinear(down, [height, width]);

            assert_eq!(up.dims(), [1, 1, height, width]);
            assert!(values(up).iter().all(|v| (v - 1.0).abs() < 1e-6));
        }
    }

    #[test]
    fn odd_ratios_keep_constant_images_constant() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::full([1, 2, 37, 53], 0.25, &device);

        let output = resize_bilinear(input, [4, 6]);

        assert_eq!(output.dims(), [1, 2, 4, 6]);
        assert!(values(output).iter().all(|v| (v - 0.25).abs() < 1e-6));
    }
}
