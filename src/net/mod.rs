//! Detection/segmentation network: a ResNet or VGG trunk followed by
//! per-cell detection and segmentation heads.

mod resnet;
mod vgg;

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder, RecorderError};

use crate::trunk::{Trunk, TrunkFamily};

pub use resnet::{ResNetTrunk, ResidualBlock, ResidualStage};
pub use vgg::{VggStage, VggTrunk};

/// Box offsets predicted per cell: `tx, ty, tw, th`.
pub const BOX_PARAMS: usize = 4;

/// Network settings loaded from the `[net]` config section.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Square input resolution images are resized to.
    pub image_size: usize,
    /// Channel width of the first trunk stage.
    pub base_width: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            image_size: 320,
            base_width: 32,
        }
    }
}

/// Everything needed to build a [`DetectionNet`].
#[derive(Debug, Clone)]
pub struct DetectionNetConfig {
    pub family: TrunkFamily,
    pub depth: usize,
    pub base_width: usize,
    /// Foreground classes; background is added on top.
    pub num_classes: usize,
    pub segmentation: bool,
}

impl DetectionNetConfig {
    pub fn new(net: &NetConfig, trunk: Trunk, num_classes: usize, segmentation: bool) -> Self {
        let (family, depth) = trunk.spec();
        DetectionNetConfig {
            family,
            depth,
            base_width: net.base_width,
            num_classes,
            segmentation,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> DetectionNet<B> {
        let (resnet, vgg, feat_channels) = match self.family {
            TrunkFamily::ResNet => (
                Some(ResNetTrunk::new(self.depth, self.base_width, device)),
                None,
                ResNetTrunk::<B>::out_channels(self.base_width),
            ),
            TrunkFamily::Vgg => (
                None,
                Some(VggTrunk::new(self.depth, self.base_width, device)),
                VggTrunk::<B>::out_channels(self.base_width),
            ),
        };
        let class_channels = self.num_classes + 1;
        DetectionNet {
            resnet,
            vgg,
            det_head: Conv2dConfig::new([feat_channels, class_channels + BOX_PARAMS], [1, 1])
                .init(device),
            seg_head: self
                .segmentation
                .then(|| Conv2dConfig::new([feat_channels, class_channels], [1, 1]).init(device)),
        }
    }
}

/// Trunk plus heads.
///
/// ```text
/// Input:     [batch, 3, S, S]
/// Trunk:     ResNet or VGG, stride 32  =>  [batch, 8w, S/32, S/32]
/// Det head:  1x1 conv => [batch, (K + 1) + 4, S/32, S/32]  (class logits, box offsets)
/// Seg head:  1x1 conv => [batch, K + 1, S/32, S/32]        (class logits)
/// ```
#[derive(Module, Debug)]
pub struct DetectionNet<B: Backend> {
    resnet: Option<ResNetTrunk<B>>,
    vgg: Option<VggTrunk<B>>,
    det_head: Conv2d<B>,
    seg_head: Option<Conv2d<B>>,
}

impl<B: Backend> DetectionNet<B> {
    pub fn num_trunk_stages(&self) -> usize {
        match (&self.resnet, &self.vgg) {
            (Some(trunk), _) => trunk.num_stages(),
            (None, Some(trunk)) => trunk.num_stages(),
            (None, None) => 0,
        }
    }

    /// Run one trunk stage; stages must be applied in order.
    pub fn trunk_stage(&self, index: usize, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match (&self.resnet, &self.vgg) {
            (Some(trunk), _) => trunk.stage_forward(index, input),
            (None, Some(trunk)) => trunk.stage_forward(index, input),
            (None, None) => input,
        }
    }

    /// Full trunk pass.
    pub fn features(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        (0..self.num_trunk_stages()).fold(input, |x, i| self.trunk_stage(i, x))
    }

    /// Detection head: class logits followed by box offsets.
    pub fn detect(&self, features: Tensor<B, 4>) -> Tensor<B, 4> {
        self.det_head.forward(features)
    }

    /// Segmentation head, if the network was built with one.
    pub fn segment(&self, features: Tensor<B, 4>) -> Option<Tensor<B, 4>> {
        self.seg_head.as_ref().map(|head| head.forward(features))
    }

    /// Replace parameters with a record serialized by [`Self::to_checkpoint_bytes`].
    pub fn load_checkpoint_bytes(
        self,
        bytes: Vec<u8>,
        device: &B::Device,
    ) -> Result<Self, RecorderError> {
        let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
        let record: <Self as Module<B>>::Record = Recorder::<B>::load(&recorder, bytes, device)?;
        Ok(self.load_record(record))
    }

    /// Serialize parameters in the checkpoint format.
    pub fn to_checkpoint_bytes(self) -> Result<Vec<u8>, RecorderError> {
        let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
        Recorder::<B>::record(&recorder, self.into_record(), ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn small_config(trunk: Trunk, segmentation: bool) -> DetectionNetConfig {
        let net = NetConfig {
            image_size: 64,
            base_width: 4,
        };
        DetectionNetConfig::new(&net, trunk, 3, segmentation)
    }

    #[test]
    fn test_detection_output_shape() {
        let device = Default::default();
        for trunk in [Trunk::Resnet50, Trunk::Vgg16] {
            let network = small_config(trunk, false).init::<TestBackend>(&device);
            let features = network.features(Tensor::zeros([1, 3, 64, 64], &device));
            let det = network.detect(features.clone());
            assert_eq!(det.shape().dims, [1, 3 + 1 + BOX_PARAMS, 2, 2], "{trunk}");
            assert!(network.segment(features).is_none());
        }
    }

    #[test]
    fn test_segmentation_head_shape() {
        let device = Default::default();
        let network = small_config(Trunk::Vgg16, true).init::<TestBackend>(&device);
        let features = network.features(Tensor::zeros([2, 3, 64, 64], &device));
        let seg = network.segment(features).unwrap();
        assert_eq!(seg.shape().dims, [2, 4, 2, 2]);
    }

    #[test]
    fn test_checkpoint_bytes_restore() {
        let device = Default::default();
        let config = small_config(Trunk::Vgg16, false);
        let source = config.init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 64, 64], &device);
        let expected: Vec<f32> = source
            .detect(source.features(input.clone()))
            .into_data()
            .to_vec()
            .unwrap();

        let bytes = source.to_checkpoint_bytes().unwrap();
        let restored = config
            .init::<TestBackend>(&device)
            .load_checkpoint_bytes(bytes, &device)
            .unwrap();
        let actual: Vec<f32> = restored
            .detect(restored.features(input))
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_garbage_bytes_fail_to_load() {
        let device = Default::default();
        let network = small_config(Trunk::Vgg16, false).init::<TestBackend>(&device);
        assert!(network.load_checkpoint_bytes(vec![1, 2, 3], &device).is_err());
    }
}
