//! MLP embedding backbone
//!
//! Fully-connected embedder over the flattened input image. Mostly useful
//! for flat or tiny inputs and as a cheap baseline.

use burn::{
    module::Module,
    nn::{LeakyRelu, LeakyReluConfig, Linear, LinearConfig},
    tensor::{backend::Backend, Tensor},
};

/// Flatten -> `depth` x (Linear + LeakyReLU) -> Linear projection
#[derive(Module, Debug)]
pub struct MlpNet<B: Backend> {
    hidden: Vec<Linear<B>>,
    act: LeakyRelu,
    out: Linear<B>,
}

impl<B: Backend> MlpNet<B> {
    /// `input_dim` is the flattened image size (`channels * height * width`).
    /// With `depth == 0` the output projection reads the flattened input
    /// directly.
    pub fn new(
        input_dim: usize,
        output_dim: usize,
        hidden_size: usize,
        depth: usize,
        device: &B::Device,
    ) -> Self {
        let mut hidden = Vec::with_capacity(depth);
        let mut in_features = input_dim;
        for _ in 0..depth {
            hidden.push(LinearConfig::new(in_features, hidden_size).init(device));
            in_features = hidden_size;
        }

        let out = LinearConfig::new(in_features, output_dim).init(device);

        Self {
            hidden,
            act: LeakyReluConfig::new().init(),
            out,
        }
    }

    /// Forward pass: `[batch, c, h, w]` -> `[batch, output_dim]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x.flatten::<2>(1, 3);
        for layer in &self.hidden {
            x = self.act.forward(layer.forward(x));
        }
        self.out.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type B = DefaultBackend;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = MlpNet::<B>::new(3 * 8 * 8, 64, 128, 2, &device);
        let input = Tensor::zeros([4, 3, 8, 8], &device);

        assert_eq!(model.forward(input).dims(), [4, 64]);
    }

    #[test]
    fn test_depth_zero_projects_input_directly() {
        let device = Default::default();
        let model = MlpNet::<B>::new(16, 8, 0, 0, &device);
        let input = Tensor::zeros([2, 1, 4, 4], &device);

        assert_eq!(model.forward(input).dims(), [2, 8]);
    }
}
