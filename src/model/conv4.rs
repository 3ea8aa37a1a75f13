//! Conv4 embedding backbone
//!
//! The classic four-stage convolutional embedder used by few-shot baselines:
//! bias-free 3x3 convolutions with BatchNorm and LeakyReLU, channel plan
//! 32-64-128-256. The stride of each stage is not a free hyperparameter; it
//! is derived from the input resolution so the feature map never collapses
//! below a minimum spatial extent.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, LeakyRelu, LeakyReluConfig, Linear, LinearConfig,
        PaddingConfig2d,
    },
    tensor::{backend::Backend, Tensor},
};

/// Channel plan of the four stages
pub const STAGE_CHANNELS: [usize; 4] = [32, 64, 128, 256];

/// Per-stage downsampling strides for a given input resolution.
///
/// With `ratio = min(height, width) / 4`, the schedule keeps a 4-stage stack
/// from reducing the feature map below a minimum extent: large inputs
/// downsample at every stage, small inputs at progressively fewer.
pub fn stride_schedule(height: usize, width: usize) -> [usize; 4] {
    let ratio = height.min(width) / 4;
    if ratio >= 16 {
        [2, 2, 2, 2]
    } else if ratio >= 8 {
        [1, 2, 2, 2]
    } else if ratio >= 4 {
        [1, 2, 2, 1]
    } else if ratio >= 2 {
        [1, 2, 1, 1]
    } else {
        [1, 1, 1, 1]
    }
}

/// Spatial extent after a 3x3, padding-1 convolution with the given stride
fn conv_out(extent: usize, stride: usize) -> usize {
    (extent - 1) / stride + 1
}

/// One conv stage: Conv2d -> BatchNorm -> LeakyReLU
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    act: LeakyRelu,
}

impl<B: Backend> ConvStage<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);
        let act = LeakyReluConfig::new().init();

        Self { conv, bn, act }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.act.forward(x)
    }
}

/// Four-stage convolutional embedder with a pooled or flattened head
#[derive(Module, Debug)]
pub struct Conv4Net<B: Backend> {
    stages: Vec<ConvStage<B>>,
    pool: Option<AdaptiveAvgPool2d>,
    out: Linear<B>,
}

impl<B: Backend> Conv4Net<B> {
    /// Build the network for one input resolution.
    ///
    /// With `gap` the head averages the spatial dimensions and projects the
    /// final channel count. Without it the flattened channel x spatial
    /// volume feeds the projection, which ties the module to this exact
    /// resolution.
    pub fn new(
        in_channels: usize,
        height: usize,
        width: usize,
        output_dim: usize,
        gap: bool,
        device: &B::Device,
    ) -> Self {
        let strides = stride_schedule(height, width);

        let mut stages = Vec::with_capacity(STAGE_CHANNELS.len());
        let mut channels = in_channels;
        for (i, &out_channels) in STAGE_CHANNELS.iter().enumerate() {
            stages.push(ConvStage::new(channels, out_channels, strides[i], device));
            channels = out_channels;
        }

        let (pool, in_features) = if gap {
            (Some(AdaptiveAvgPool2dConfig::new([1, 1]).init()), channels)
        } else {
            let (mut h, mut w) = (height, width);
            for &stride in &strides {
                h = conv_out(h, stride);
                w = conv_out(w, stride);
            }
            (None, channels * h * w)
        };

        let out = LinearConfig::new(in_features, output_dim).init(device);

        Self { stages, pool, out }
    }

    /// Forward pass: `[batch, c, h, w]` -> `[batch, output_dim]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        for stage in &self.stages {
            x = stage.forward(x);
        }

        let features = match &self.pool {
            Some(pool) => {
                let x = pool.forward(x);
                let [batch, channels, _, _] = x.dims();
                x.reshape([batch, channels])
            }
            None => x.flatten::<2>(1, 3),
        };

        self.out.forward(features)
    }
}
