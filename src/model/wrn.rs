//! Wide ResNet embedding backbone
//!
//! CIFAR-style WRN-d-k: a 3x3 stem, three groups of pre-activation basic
//! blocks with widths `[16k, 32k, 64k]` and strides `[1, 2, 2]`, then
//! BatchNorm, ReLU, global average pooling and a linear projection. The
//! depth must be of the form `6n + 4`.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

fn conv3x3<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

/// Pre-activation basic block with an optional projection shortcut
#[derive(Module, Debug)]
pub struct WrnBlock<B: Backend> {
    bn1: BatchNorm<B, 2>,
    conv1: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    shortcut: Option<Conv2d<B>>,
    act: Relu,
}

impl<B: Backend> WrnBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let shortcut = if in_channels != out_channels || stride != 1 {
            Some(
                Conv2dConfig::new([in_channels, out_channels], [1, 1])
                    .with_stride([stride, stride])
                    .with_bias(false)
                    .init(device),
            )
        } else {
            None
        };

        Self {
            bn1: BatchNormConfig::new(in_channels).init(device),
            conv1: conv3x3(in_channels, out_channels, stride, device),
            bn2: BatchNormConfig::new(out_channels).init(device),
            conv2: conv3x3(out_channels, out_channels, 1, device),
            shortcut,
            act: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let preact = self.act.forward(self.bn1.forward(x.clone()));

        // The projection shortcut reads the pre-activated input
        let residual = match &self.shortcut {
            Some(projection) => projection.forward(preact.clone()),
            None => x,
        };

        let out = self.conv1.forward(preact);
        let out = self.conv2.forward(self.act.forward(self.bn2.forward(out)));

        out + residual
    }
}

/// Wide residual embedder
#[derive(Module, Debug)]
pub struct WrnNet<B: Backend> {
    stem: Conv2d<B>,
    blocks: Vec<WrnBlock<B>>,
    bn: BatchNorm<B, 2>,
    act: Relu,
    pool: AdaptiveAvgPool2d,
    out: Linear<B>,
}

impl<B: Backend> WrnNet<B> {
    /// `depth = 6n + 4`; validated by the factory before construction.
    pub fn new(
        in_channels: usize,
        depth: usize,
        width: usize,
        output_dim: usize,
        device: &B::Device,
    ) -> Self {
        let blocks_per_group = (depth - 4) / 6;
        let widths = [16 * width, 32 * width, 64 * width];
        let group_strides = [1, 2, 2];

        let stem = conv3x3(in_channels, 16, 1, device);

        let mut blocks = Vec::with_capacity(3 * blocks_per_group);
        let mut channels = 16;
        for group in 0..3 {
            for block in 0..blocks_per_group {
                let stride = if block == 0 { group_strides[group] } else { 1 };
                blocks.push(WrnBlock::new(channels, widths[group], stride, device));
                channels = widths[group];
            }
        }

        Self {
            stem,
            blocks,
            bn: BatchNormConfig::new(channels).init(device),
            act: Relu::new(),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            out: LinearConfig::new(channels, output_dim).init(device),
        }
    }

    /// Forward pass: `[batch, c, h, w]` -> `[batch, output_dim]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.act.forward(self.bn.forward(x));

        let x = self.pool.forward(x);
        let [batch, channels, _, _] = x.dims();
        let x = x.reshape([batch, channels]);

        self.out.forward(x)
    }
}
