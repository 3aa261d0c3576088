use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d, Relu};
use burn::prelude::*;

/// Residual blocks per stage for a given ResNet depth.
pub fn stage_blocks(depth: usize) -> [usize; 4] {
    match depth {
        18 => [2, 2, 2, 2],
        101 => [3, 4, 23, 3],
        152 => [3, 8, 36, 3],
        _ => [3, 4, 6, 3],
    }
}

/// Two 3x3 convolutions with batch norm and an identity (or projected)
/// shortcut.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    shortcut: Option<Conv2d<B>>,
    relu: Relu,
}

impl<B: Backend> ResidualBlock<B> {
    fn new(channels: [usize; 2], stride: usize, device: &B::Device) -> Self {
        let [c_in, c_out] = channels;
        let shortcut = (stride != 1 || c_in != c_out).then(|| {
            Conv2dConfig::new([c_in, c_out], [1, 1])
                .with_stride([stride, stride])
                .init(device)
        });
        ResidualBlock {
            conv1: Conv2dConfig::new([c_in, c_out], [3, 3])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            bn1: BatchNormConfig::new(c_out).init(device),
            conv2: Conv2dConfig::new([c_out, c_out], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            bn2: BatchNormConfig::new(c_out).init(device),
            shortcut,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.shortcut {
            Some(conv) => conv.forward(input.clone()),
            None => input.clone(),
        };
        let x = self.relu.forward(self.bn1.forward(self.conv1.forward(input)));
        let x = self.bn2.forward(self.conv2.forward(x));
        self.relu.forward(x + identity)
    }
}

#[derive(Module, Debug)]
pub struct ResidualStage<B: Backend> {
    blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> ResidualStage<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(input, |x, block| block.forward(x))
    }
}

/// ResNet-style trunk, output stride 32.
///
/// ```text
/// Stem:    7x7 conv stride 2, BN, ReLU, 2x2 max pool  =>  /4
/// Stage 1: blocks[0] x residual, width w              =>  /4
/// Stage 2: blocks[1] x residual, width 2w, stride 2   =>  /8
/// Stage 3: blocks[2] x residual, width 4w, stride 2   =>  /16
/// Stage 4: blocks[3] x residual, width 8w, stride 2   =>  /32
/// ```
#[derive(Module, Debug)]
pub struct ResNetTrunk<B: Backend> {
    stem_conv: Conv2d<B>,
    stem_bn: BatchNorm<B, 2>,
    stem_pool: MaxPool2d,
    stages: Vec<ResidualStage<B>>,
    relu: Relu,
}

impl<B: Backend> ResNetTrunk<B> {
    pub fn new(depth: usize, base_width: usize, device: &B::Device) -> Self {
        let widths = [base_width, base_width * 2, base_width * 4, base_width * 8];
        let mut c_in = base_width;
        let mut stages = Vec::with_capacity(4);
        for (i, (&n_blocks, &width)) in stage_blocks(depth).iter().zip(&widths).enumerate() {
            let first_stride = if i == 0 { 1 } else { 2 };
            let blocks = (0..n_blocks)
                .map(|b| {
                    let stride = if b == 0 { first_stride } else { 1 };
                    let block = ResidualBlock::new([c_in, width], stride, device);
                    c_in = width;
                    block
                })
                .collect();
            stages.push(ResidualStage { blocks });
        }

        ResNetTrunk {
            stem_conv: Conv2dConfig::new([3, base_width], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .init(device),
            stem_bn: BatchNormConfig::new(base_width).init(device),
            stem_pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            stages,
            relu: Relu::new(),
        }
    }

    /// Stem plus the four residual stages.
    pub fn num_stages(&self) -> usize {
        1 + self.stages.len()
    }

    /// Run stage `index`; index 0 is the stem.
    pub fn stage_forward(&self, index: usize, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match index {
            0 => {
                let x = self.relu.forward(self.stem_bn.forward(self.stem_conv.forward(input)));
                self.stem_pool.forward(x)
            }
            i => self.stages[i - 1].forward(input),
        }
    }

    pub fn out_channels(base_width: usize) -> usize {
        base_width * 8
    }
}
