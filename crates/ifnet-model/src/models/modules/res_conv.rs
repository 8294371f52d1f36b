//! Residual refinement unit.

use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Initializer, LeakyRelu, LeakyReluConfig, PaddingConfig2d,
    },
    prelude::*,
};

use super::LEAKY_SLOPE;

/// Configuration for the `ResConv` module.
#[derive(Config, Debug)]
pub struct ResConvConfig {
    /// Channel count, preserved by the unit.
    channels: usize,
    #[config(default = "None")]
    initializer: Option<Initializer>,
}

impl ResConvConfig {
    /// Initializes a `ResConv` module with `beta` set to ones.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ResConv<B> {
        let mut conv = Conv2dConfig::new([self.channels, self.channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1));
        if let Some(initializer) = &self.initializer {
            conv = conv.with_initializer(initializer.clone());
        }

        ResConv {
            conv: conv.init(device),
            beta: Param::from_tensor(Tensor::ones([1, self.channels, 1, 1], device)),
            relu: LeakyReluConfig::new()
                .with_negative_slope(LEAKY_SLOPE)
                .init(),
        }
    }
}

/// Computes `leaky_relu(conv(x) * beta + x)`.
///
/// `beta` is a learned per-channel scale on the residual branch.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, height, width]`
#[derive(Module, Debug)]
pub struct ResConv<B: Backend> {
    pub(crate) conv: Conv2d<B>,
    pub(crate) beta: Param<Tensor<B, 4>>,
    relu: LeakyRelu,
}

impl<B: Backend> ResConv<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let shape = x.dims();
        let residual = self.conv.forward(x.clone()) * self.beta.val().expand(shape);
        self.relu.forward(residual + x)
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{Distribution, TensorData};

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn res_conv_preserves_shape() {
        let device = Default::default();
        let unit = ResConvConfig::new(6).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::random([1, 6, 9, 11], Distribution::Default, &device);

        assert_eq!(unit.forward(input).dims(), [1, 6, 9, 11]);
    }

    #[test]
    fn beta_starts_at_one() {
        let device = Default::default();
        let unit = ResConvConfig::new(4).init::<TestBackend>(&device);

        let beta = unit.beta.val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(beta, vec![1.0; 4]);
    }

    #[test]
    fn silent_conv_reduces_to_leaky_relu() {
        let device = Default::default();
        let unit = ResConvConfig::new(1)
            .with_initializer(Some(Initializer::Zeros))
            .init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![-1.0_f32, 0.0, 0.5, 2.0], [1, 1, 2, 2]),
            &device,
        );

        let output = unit.forward(input).into_data().to_vec::<f32>().unwrap();

        let expected = [-0.2_f32, 0.0, 0.5, 2.0];
        for (a, e) in output.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-6, "{a} != {e}");
        }
    }
}
