use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{PaddingConfig2d, Relu};
use burn::prelude::*;

/// 3x3 convolutions per stage for a given VGG depth.
pub fn stage_convs(depth: usize) -> [usize; 5] {
    match depth {
        11 => [1, 1, 2, 2, 2],
        13 => [2, 2, 2, 2, 2],
        19 => [2, 2, 4, 4, 4],
        _ => [2, 2, 3, 3, 3],
    }
}

#[derive(Module, Debug)]
pub struct VggStage<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    relu: Relu,
}

impl<B: Backend> VggStage<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self
            .convs
            .iter()
            .fold(input, |x, conv| self.relu.forward(conv.forward(x)));
        self.pool.forward(x)
    }
}

/// VGG-style trunk: five stages of padded 3x3 conv + ReLU, each followed by
/// a 2x2 max pool (output stride 32). Widths `w, 2w, 4w, 8w, 8w`.
#[derive(Module, Debug)]
pub struct VggTrunk<B: Backend> {
    stages: Vec<VggStage<B>>,
}

impl<B: Backend> VggTrunk<B> {
    pub fn new(depth: usize, base_width: usize, device: &B::Device) -> Self {
        let widths = [
            base_width,
            base_width * 2,
            base_width * 4,
            base_width * 8,
            base_width * 8,
        ];
        let mut c_in = 3;
        let mut stages = Vec::with_capacity(5);
        for (&n_convs, &width) in stage_convs(depth).iter().zip(&widths) {
            let mut convs = Vec::with_capacity(n_convs);
            for _ in 0..n_convs {
                convs.push(
                    Conv2dConfig::new([c_in, width], [3, 3])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .init(device),
                );
                c_in = width;
            }
            stages.push(VggStage {
                convs,
                pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
                relu: Relu::new(),
            });
        }
        VggTrunk { stages }
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn stage_forward(&self, index: usize, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.stages[index].forward(input)
    }

    pub fn out_channels(base_width: usize) -> usize {
        base_width * 8
    }
}
