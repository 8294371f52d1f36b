//! Folding a role-swapped estimate back into the primary one.
//!
//! When a stage runs a second time with `img0` and `img1` exchanged, its flow halves
//! describe the opposite sources and its mask favours the opposite frame. These helpers
//! undo the swap before averaging.

use burn::prelude::*;

/// Exchanges the two flow directions: `[f0x, f0y, f1x, f1y]` becomes `[f1x, f1y, f0x, f0y]`.
pub fn swap_directions<B: Backend>(flow: Tensor<B, 4>) -> Tensor<B, 4> {
    Tensor::cat(vec![flow.clone().narrow(1, 2, 2), flow.narrow(1, 0, 2)], 1)
}

/// `(primary + swap_directions(swapped)) / 2`.
pub fn merge_flow<B: Backend>(primary: Tensor<B, 4>, swapped: Tensor<B, 4>) -> Tensor<B, 4> {
    (primary + swap_directions(swapped)).div_scalar(2.0)
}

/// `(primary - swapped) / 2`.
///
/// A logit favouring `img1` in the swapped pass favours `img0` in the primary one, so
/// the swapped mask enters negated.
pub fn merge_mask<B: Backend>(primary: Tensor<B, 4>, swapped: Tensor<B, 4>) -> Tensor<B, 4> {
    (primary + swapped.neg()).div_scalar(2.0)
}

#[cfg(test)]
mod tests {
    use burn::tensor::{Distribution, TensorData};

    use super::*;
    use crate::tests::TestBackend;

    fn pixel(values: [f32; 4]) -> Tensor<TestBackend, 4> {
        Tensor::from_data(
            TensorData::new(values.to_vec(), [1, 4, 1, 1]),
            &Default::default(),
        )
    }

    fn values(tensor: Tensor<TestBackend, 4>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn swap_exchanges_direction_pairs() {
        let swapped = swap_directions(pixel([1.0, 2.0, 3.0, 4.0]));

        assert_eq!(values(swapped), vec![3.0, 4.0, 1.0, 2.0]);
    }

    #[test]
    fn swap_is_an_involution() {
        let device = Default::default();
        let flow =
            Tensor::<TestBackend, 4>::random([2, 4, 3, 5], Distribution::Default, &device);

        let twice = swap_directions(swap_directions(flow.clone()));

        assert_eq!(values(twice), values(flow));
    }

    #[test]
    fn merge_flow_averages_direction_corrected_estimates() {
        let primary = pixel([1.0, 2.0, 3.0, 4.0]);
        let swapped = pixel([10.0, 20.0, 30.0, 40.0]);

        let merged = merge_flow(primary, swapped);

        // Primary [1, 2, 3, 4] against corrected [30, 40, 10, 20].
        assert_eq!(values(merged), vec![15.5, 21.0, 6.5, 12.0]);
    }

    #[test]
    fn consistent_estimates_are_a_fixed_point() {
        // A swapped pass that agrees with the primary one changes nothing.
        let primary = pixel([1.0, -2.0, 0.5, 3.0]);
        let swapped = swap_directions(primary.clone());

        let merged = merge_flow(primary.clone(), swapped);

        assert_eq!(values(merged), values(primary));
    }

    #[test]
    fn merge_mask_negates_swapped_logits() {
        let device = Default::default();
        let primary = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![2.0_f32, -1.0], [1, 1, 1, 2]),
            &device,
        );
        let swapped = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![-2.0_f32, 3.0], [1, 1, 1, 2]),
            &device,
        );

        let merged = merge_mask(primary, swapped);

        assert_eq!(values(merged), vec![2.0, -2.0]);
    }
}
