//! Accuracy evaluators and the glue that drives them per checkpoint.

mod ap;
mod coco;
mod segmentation;
mod voc;

use std::fmt;

use burn::prelude::Backend;

use crate::checkpoint::CheckpointEvaluator;
use crate::detector::Detector;
use crate::error::EvalError;

pub use ap::{average_precision, Interpolation, MatchAccumulator};
pub use coco::CocoEval;
pub use segmentation::{ConfusionMatrix, IGNORE_LABEL};
pub use voc::Evaluation;

/// Computes accuracy metrics of a restored network over a dataset.
pub trait Evaluator<B: Backend> {
    /// Drop state accumulated for the previous checkpoint.
    fn reset(&mut self);

    /// Run `detector` over the whole dataset and return the report line for
    /// checkpoint `ckpt`.
    fn evaluate_network(
        &mut self,
        detector: &mut Detector<B>,
        ckpt: u64,
    ) -> Result<String, EvalError>;
}

/// Named metric values of one checkpoint.
///
/// Renders as `<ckpt>\t<key>=<value>\t...`, the line format of the
/// evaluation log.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub ckpt: u64,
    pub metrics: Vec<(String, f32)>,
}

impl Report {
    pub fn new(ckpt: u64) -> Self {
        Report {
            ckpt,
            metrics: Vec::new(),
        }
    }

    pub fn push(&mut self, key: impl Into<String>, value: f32) {
        self.metrics.push((key.into(), value));
    }

    pub fn get(&self, key: &str) -> Option<f32> {
        self.metrics
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ckpt)?;
        for (key, value) in &self.metrics {
            write!(f, "\t{key}={value:.4}")?;
        }
        Ok(())
    }
}

/// A detector paired with its evaluator; what batch runs iterate over.
pub struct EvalPipeline<B: Backend> {
    detector: Detector<B>,
    evaluator: Box<dyn Evaluator<B>>,
}

impl<B: Backend> EvalPipeline<B> {
    pub fn new(detector: Detector<B>, evaluator: Box<dyn Evaluator<B>>) -> Self {
        EvalPipeline {
            detector,
            evaluator,
        }
    }

    pub fn detector(&self) -> &Detector<B> {
        &self.detector
    }

    /// Restore `ckpt` and evaluate it once.
    pub fn evaluate_single(&mut self, ckpt: u64) -> Result<String, EvalError> {
        self.reset();
        self.restore(ckpt)?;
        self.evaluate(ckpt)
    }
}

impl<B: Backend> CheckpointEvaluator for EvalPipeline<B> {
    fn reset(&mut self) {
        self.evaluator.reset();
        self.detector.reset_profiler();
    }

    fn restore(&mut self, index: u64) -> Result<(), EvalError> {
        Ok(self.detector.restore_from_ckpt(index)?)
    }

    fn evaluate(&mut self, index: u64) -> Result<String, EvalError> {
        self.evaluator.evaluate_network(&mut self.detector, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{index_to_filename, CheckpointManager, EvalLog};

    #[test]
    fn test_report_line_format() {
        let mut report = Report::new(12);
        report.push("mAP", 0.5);
        report.push("mIoU", 0.25);
        assert_eq!(report.to_string(), "12\tmAP=0.5000\tmIoU=0.2500");
        assert_eq!(report.get("mIoU"), Some(0.25));
        assert_eq!(report.get("AP50"), None);
    }

    #[test]
    fn test_report_lines_feed_the_high_water_mark() {
        let dir = tempfile::tempdir().unwrap();
        let log = EvalLog::new(dir.path().join("evaluations.txt"));
        let mut writer = log.open_writer().unwrap();
        for ckpt in [3, 12, 7] {
            let mut report = Report::new(ckpt);
            report.push("mAP", 0.1);
            writer.append(&report.to_string()).unwrap();
        }
        assert_eq!(log.evaluated_indices().unwrap(), vec![3, 12, 7]);
        assert_eq!(
            log.high_water_mark(crate::checkpoint::HighWaterMarkPolicy::MaxOfAll)
                .unwrap(),
            12
        );
    }

    /// Pipeline over the VOC12 fixture under `root` with checkpoint 4 on disk.
    fn voc_pipeline(
        root: &std::path::Path,
        profile: bool,
    ) -> EvalPipeline<burn::backend::NdArray<f32>> {
        use crate::dataset::{test_support, DatasetLoader, VocLoader};
        use crate::detector::{DecodeParams, DetectorOptions, EvalSession};
        use crate::net::{DetectionNetConfig, NetConfig};
        use crate::profiler::Profiler;
        use crate::trunk::Trunk;
        use std::sync::Arc;

        test_support::write_voc12_fixture(root);
        let loader: Arc<dyn DatasetLoader> =
            Arc::new(VocLoader::new(root, "12", "val", true).unwrap());
        let session = EvalSession::<burn::backend::NdArray<f32>>::new(Default::default());
        let net = NetConfig {
            image_size: 64,
            base_width: 4,
        };
        let network = DetectionNetConfig::new(&net, Trunk::Vgg16, loader.num_classes(), true)
            .init(session.device());

        let run_dir = root.join("run");
        std::fs::create_dir_all(&run_dir).unwrap();
        let bytes = network.clone().to_checkpoint_bytes().unwrap();
        std::fs::write(run_dir.join(index_to_filename(4)), bytes).unwrap();

        let options = DetectorOptions {
            image_size: 64,
            detect: true,
            segment: true,
            no_gt: false,
            decode: DecodeParams {
                conf_thresh: 0.01,
                nms_thresh: 0.45,
                top_k: 10,
            },
        };
        let detector = Detector::new(
            session,
            network,
            loader.clone(),
            CheckpointManager::new(&run_dir),
            options,
            profile.then(Profiler::new),
        );
        EvalPipeline::new(detector, Box::new(Evaluation::new(loader, 0.5)))
    }

    #[test]
    fn test_pipeline_single_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = voc_pipeline(dir.path(), false);

        let line = pipeline.evaluate_single(4).unwrap();
        assert!(line.starts_with("4\t"), "{line}");
        assert!(line.contains("mAP="));
        assert!(line.contains("mIoU="));
        assert!(line.contains("pixAcc="));
        assert_eq!(pipeline.detector().restored(), Some(4));

        assert!(pipeline.evaluate_single(5).is_err());
    }

    #[test]
    fn test_image_smaller_than_annotation() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = voc_pipeline(dir.path(), false);
        // Annotation and mask stay 32x32.
        image::RgbImage::from_pixel(16, 16, image::Rgb([90, 90, 90]))
            .save(dir.path().join("VOCdevkit/VOC2012/JPEGImages/a.png"))
            .unwrap();

        let line = pipeline.evaluate_single(4).unwrap();
        assert!(line.starts_with("4\t"), "{line}");
        assert!(line.contains("mIoU="));
    }

    #[test]
    fn test_profiler_steps_restart_per_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = voc_pipeline(dir.path(), true);
        pipeline.evaluate_single(4).unwrap();
        pipeline.evaluate_single(4).unwrap();
        // Two images per checkpoint; the second run starts over.
        assert_eq!(pipeline.detector().profiler().unwrap().steps(), 2);
    }
}
