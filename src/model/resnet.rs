//! ResNet-18 embedding backbone
//!
//! Standard 18-layer residual network: 7x7 stem, four groups of two basic
//! blocks with strides `[1, 2, 2, 2]`, global average pooling and a linear
//! projection. Pretrained weights, when configured, are loaded from an
//! externally produced record file after construction.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Channel plan of the four block groups
const GROUP_CHANNELS: [usize; 4] = [64, 128, 256, 512];

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

/// 1x1 projection used when a block changes resolution or width
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Post-activation basic block
#[derive(Module, Debug)]
pub struct ResBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
    act: Relu,
}

impl<B: Backend> ResBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = if in_channels != out_channels || stride != 1 {
            Some(Downsample::new(in_channels, out_channels, stride, device))
        } else {
            None
        };

        Self {
            conv1: conv3x3(in_channels, out_channels, stride, device),
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2: conv3x3(out_channels, out_channels, 1, device),
            bn2: BatchNormConfig::new(out_channels).init(device),
            downsample,
            act: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = match &self.downsample {
            Some(down) => down.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.act.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.bn2.forward(self.conv2.forward(out));

        self.act.forward(out + residual)
    }
}

/// 18-layer residual embedder
#[derive(Module, Debug)]
pub struct Resnet18Net<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    act: Relu,
    maxpool: MaxPool2d,
    blocks: Vec<ResBlock<B>>,
    pool: AdaptiveAvgPool2d,
    fc: Linear<B>,
}

impl<B: Backend> Resnet18Net<B> {
    /// The stem convolution is built with the requested channel count; the
    /// factory is responsible for refusing non-RGB channels together with
    /// pretrained weights before calling this.
    pub fn new(in_channels: usize, output_dim: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, 64], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut blocks = Vec::with_capacity(8);
        let mut channels = 64;
        for (group, &out_channels) in GROUP_CHANNELS.iter().enumerate() {
            let group_stride = if group == 0 { 1 } else { 2 };
            blocks.push(ResBlock::new(channels, out_channels, group_stride, device));
            blocks.push(ResBlock::new(out_channels, out_channels, 1, device));
            channels = out_channels;
        }

        Self {
            conv1,
            bn1: BatchNormConfig::new(64).init(device),
            act: Relu::new(),
            maxpool,
            blocks,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(channels, output_dim).init(device),
        }
    }

    /// Forward pass: `[batch, c, h, w]` -> `[batch, output_dim]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.act.forward(self.bn1.forward(self.conv1.forward(x)));
        let mut x = self.maxpool.forward(x);

        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.pool.forward(x);
        let [batch, channels, _, _] = x.dims();
        let x = x.reshape([batch, channels]);

        self.fc.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type B = DefaultBackend;

    #[test]
    fn test_resnet18_output_shape() {
        let device = Default::default();
        let model = Resnet18Net::<B>::new(3, 64, &device);
        let input = Tensor::zeros([2, 3, 64, 64], &device);

        assert_eq!(model.forward(input).dims(), [2, 64]);
    }

    #[test]
    fn test_resnet18_has_eight_blocks() {
        let device = Default::default();
        let model = Resnet18Net::<B>::new(3, 16, &device);
        assert_eq!(model.blocks.len(), 8);
    }

    #[test]
    fn test_resnet18_single_channel_stem() {
        let device = Default::default();
        let model = Resnet18Net::<B>::new(1, 32, &device);
        let input = Tensor::zeros([1, 1, 64, 64], &device);

        assert_eq!(model.forward(input).dims(), [1, 32]);
    }
}
