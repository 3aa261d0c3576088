//! Network wrapper that restores checkpoints and turns images into
//! detections and segmentation maps.

mod boxes;
mod postprocess;

use std::sync::Arc;

use burn::prelude::*;
use burn::tensor::TensorData;
use image::imageops::FilterType;
use image::RgbImage;

use crate::checkpoint::CheckpointManager;
use crate::dataset::{DatasetLoader, Sample};
use crate::error::{CheckpointError, EvalError};
use crate::net::DetectionNet;
use crate::profiler::{profile_scope, Profiler};

pub use boxes::BBox;
pub use postprocess::{
    decode_detections, decode_segmentation, non_max_suppression, resize_labels, DecodeParams,
    Detection,
};

/// ImageNet channel statistics used to normalize inputs.
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Device-bound evaluation session. Created once per run and released when
/// dropped.
pub struct EvalSession<B: Backend> {
    device: B::Device,
}

impl<B: Backend> EvalSession<B> {
    pub fn new(device: B::Device) -> Self {
        tracing::debug!(?device, "Opened evaluation session");
        EvalSession { device }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

impl<B: Backend> Drop for EvalSession<B> {
    fn drop(&mut self) {
        tracing::debug!(device = ?self.device, "Closed evaluation session");
    }
}

/// What the detector computes per image.
#[derive(Debug, Clone, Copy)]
pub struct DetectorOptions {
    pub image_size: usize,
    pub detect: bool,
    pub segment: bool,
    /// Segmentation ground truth is unavailable; skip segmentation scoring.
    pub no_gt: bool,
    pub decode: DecodeParams,
}

/// Row-major class-index map with its own resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMap {
    pub labels: Vec<u8>,
    pub height: usize,
    pub width: usize,
}

impl SegmentationMap {
    pub fn new(labels: Vec<u8>, height: usize, width: usize) -> Self {
        SegmentationMap {
            labels,
            height,
            width,
        }
    }

    /// Labels resampled to `(height, width)`; `None` if the buffer does not
    /// hold `height * width` labels.
    pub fn resized_to(&self, size: (usize, usize)) -> Option<Vec<u8>> {
        if self.labels.len() != self.height * self.width {
            return None;
        }
        if size == (self.height, self.width) {
            Some(self.labels.clone())
        } else {
            Some(resize_labels(&self.labels, (self.height, self.width), size))
        }
    }
}

/// Network output for one image, in the coordinates of the decoded image.
#[derive(Debug, Clone, Default)]
pub struct Prediction {
    pub detections: Vec<Detection>,
    pub segmentation: Option<SegmentationMap>,
}

/// Owns the session, network and checkpoint access for one evaluation run.
pub struct Detector<B: Backend> {
    session: EvalSession<B>,
    network: DetectionNet<B>,
    loader: Arc<dyn DatasetLoader>,
    checkpoints: CheckpointManager,
    options: DetectorOptions,
    profiler: Option<Profiler>,
    restored: Option<u64>,
}

impl<B: Backend> Detector<B> {
    pub fn new(
        session: EvalSession<B>,
        network: DetectionNet<B>,
        loader: Arc<dyn DatasetLoader>,
        checkpoints: CheckpointManager,
        options: DetectorOptions,
        profiler: Option<Profiler>,
    ) -> Self {
        Detector {
            session,
            network,
            loader,
            checkpoints,
            options,
            profiler,
            restored: None,
        }
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }

    pub fn profiler(&self) -> Option<&Profiler> {
        self.profiler.as_ref()
    }

    /// Drop profile records so steps count from 1 for the next checkpoint.
    pub fn reset_profiler(&mut self) {
        if let Some(profiler) = self.profiler.as_mut() {
            profiler.reset();
        }
    }

    /// Checkpoint whose parameters are currently loaded.
    pub fn restored(&self) -> Option<u64> {
        self.restored
    }

    /// Load the parameters of checkpoint `index`.
    pub fn restore_from_ckpt(&mut self, index: u64) -> Result<(), CheckpointError> {
        let path = self.checkpoints.path_for(index);
        let bytes = self.checkpoints.read(index)?;
        tracing::info!("Restoring parameters from {}", path.display());
        self.network = self
            .network
            .clone()
            .load_checkpoint_bytes(bytes, self.session.device())
            .map_err(|e| CheckpointError::RecordLoad {
                path,
                reason: e.to_string(),
            })?;
        self.restored = Some(index);
        Ok(())
    }

    /// Run the network on one sample's image.
    pub fn predict(&mut self, sample: &Sample) -> Result<Prediction, EvalError> {
        let image = self.loader.load_image(sample)?;
        let (width, height) = image.dimensions();
        let input = self.preprocess(&image);

        if let Some(profiler) = self.profiler.as_mut() {
            profiler.begin_step();
        }

        let network = &self.network;
        let mut x = input;
        for i in 0..network.num_trunk_stages() {
            x = profile_scope(
                self.profiler.as_mut(),
                &format!("net/trunk/stage{i}"),
                || network.trunk_stage(i, x),
                tensor_bytes,
            );
        }
        let features = x;

        let mut prediction = Prediction::default();
        if self.options.detect {
            let head = profile_scope(
                self.profiler.as_mut(),
                "net/det_head",
                || network.detect(features.clone()),
                tensor_bytes,
            );
            let [_, _, grid_h, grid_w] = head.dims();
            let values = tensor_values(head)?;
            let num_classes = self.loader.num_classes();
            let decode = self.options.decode;
            prediction.detections = profile_scope(
                self.profiler.as_mut(),
                "postprocess/detections",
                || {
                    decode_detections(
                        &values,
                        num_classes,
                        (grid_h, grid_w),
                        (width, height),
                        &decode,
                    )
                },
                |_| 0,
            );
        }
        if self.options.segment {
            let head = profile_scope(
                self.profiler.as_mut(),
                "net/seg_head",
                || network.segment(features),
                |t| t.as_ref().map_or(0, tensor_bytes),
            );
            if let Some(head) = head {
                let [_, labels, grid_h, grid_w] = head.dims();
                let values = tensor_values(head)?;
                let map = decode_segmentation(&values, labels, (grid_h, grid_w));
                let (height, width) = (height as usize, width as usize);
                prediction.segmentation = Some(SegmentationMap::new(
                    resize_labels(&map, (grid_h, grid_w), (height, width)),
                    height,
                    width,
                ));
            }
        }
        Ok(prediction)
    }

    /// Resize to the network resolution and normalize into `[1, 3, S, S]`.
    fn preprocess(&self, image: &RgbImage) -> Tensor<B, 4> {
        let size = self.options.image_size as u32;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let plane = (size * size) as usize;
        let mut flat = vec![0.0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                flat[c * plane + i] = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
            }
        }
        Tensor::<B, 1>::from_data(TensorData::from(flat.as_slice()), self.session.device())
            .reshape([1, 3, size as usize, size as usize])
    }
}

fn tensor_bytes<B: Backend>(t: &Tensor<B, 4>) -> u64 {
    (t.shape().num_elements() * std::mem::size_of::<f32>()) as u64
}

fn tensor_values<B: Backend>(t: Tensor<B, 4>) -> Result<Vec<f32>, EvalError> {
    t.into_data()
        .to_vec::<f32>()
        .map_err(|e| EvalError::Tensor(format!("{e:?}")))
}
