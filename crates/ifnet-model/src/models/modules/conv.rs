use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Initializer, LeakyRelu, LeakyReluConfig, PaddingConfig2d,
    },
    prelude::*,
};

/// Negative slope shared by every activation in the network.
pub const LEAKY_SLOPE: f64 = 0.2;

/// Configuration for the `ConvLeaky` module.
#[derive(Config, Debug)]
pub struct ConvLeakyConfig {
    in_channels: usize,
    out_channels: usize,
    #[config(default = "1")]
    stride: usize,
    /// Overrides Burn's default weight initializer when set.
    #[config(default = "None")]
    initializer: Option<Initializer>,
}

impl ConvLeakyConfig {
    /// Initializes a `ConvLeaky` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ConvLeaky<B> {
        let mut conv = Conv2dConfig::new([self.in_channels, self.out_channels], [3, 3])
            .with_stride([self.stride, self.stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1));
        if let Some(initializer) = &self.initializer {
            conv = conv.with_initializer(initializer.clone());
        }

        ConvLeaky {
            conv: conv.init(device),
            act: LeakyReluConfig::new()
                .with_negative_slope(LEAKY_SLOPE)
                .init(),
        }
    }
}

/// A 3x3 convolution followed by a leaky ReLU.
#[derive(Module, Debug)]
pub struct ConvLeaky<B: Backend> {
    pub(crate) conv: Conv2d<B>,
    act: LeakyRelu,
}

impl<B: Backend> ConvLeaky<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.act.forward(self.conv.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn strided_conv_halves_resolution() {
        let device = Default::default();
        let module = ConvLeakyConfig::new(5, 7)
            .with_stride(2)
            .init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::random([2, 5, 16, 10], Distribution::Default, &device);

        assert_eq!(module.forward(input).dims(), [2, 7, 8, 5]);
    }
}
