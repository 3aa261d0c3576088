use std::sync::Arc;
use std::time::Instant;

use burn::prelude::Backend;

use crate::dataset::{DatasetLoader, Sample};
use crate::detector::{Detector, Prediction, SegmentationMap};
use crate::error::EvalError;
use crate::eval::ap::{Interpolation, MatchAccumulator};
use crate::eval::segmentation::ConfusionMatrix;
use crate::eval::{Evaluator, Report};

/// PASCAL VOC protocol: per-class AP at one IoU threshold and, for
/// segmentation, mean IoU over the label set.
pub struct Evaluation {
    loader: Arc<dyn DatasetLoader>,
    iou_thresh: f32,
    per_class: Vec<MatchAccumulator>,
    confusion: ConfusionMatrix,
    seg_images: usize,
}

impl Evaluation {
    pub fn new(loader: Arc<dyn DatasetLoader>, iou_thresh: f32) -> Self {
        let num_classes = loader.num_classes();
        Evaluation {
            loader,
            iou_thresh,
            per_class: vec![MatchAccumulator::new(); num_classes],
            confusion: ConfusionMatrix::new(num_classes + 1),
            seg_images: 0,
        }
    }

    pub fn interpolation(&self) -> Interpolation {
        if self.loader.uses_07_metric() {
            Interpolation::ElevenPoint
        } else {
            Interpolation::AllPoint
        }
    }

    /// Score one image's detections against its ground truth.
    pub fn add_detections(&mut self, sample: &Sample, prediction: &Prediction) {
        for (i, acc) in self.per_class.iter_mut().enumerate() {
            acc.add_image(&prediction.detections, &sample.objects, i + 1, self.iou_thresh);
        }
    }

    /// Score a predicted label map against a `(width, height)` ground-truth
    /// mask, resampling the prediction when the two sizes differ.
    pub fn add_segmentation(
        &mut self,
        sample: &Sample,
        predicted: &SegmentationMap,
        mask: &[u8],
        mask_size: (u32, u32),
    ) -> Result<(), EvalError> {
        let (w, h) = (mask_size.0 as usize, mask_size.1 as usize);
        let size_error = |expected: usize, actual: usize| EvalError::SegmentationSize {
            file_name: sample.file_name.clone(),
            expected,
            actual,
        };
        if mask.len() != w * h {
            return Err(size_error(w * h, mask.len()));
        }
        let labels = predicted.resized_to((h, w)).ok_or_else(|| {
            size_error(predicted.height * predicted.width, predicted.labels.len())
        })?;
        self.confusion.add(mask, &labels);
        self.seg_images += 1;
        Ok(())
    }

    /// Metrics accumulated so far.
    pub fn report(&self, ckpt: u64) -> Report {
        let mut report = Report::new(ckpt);
        let interpolation = self.interpolation();
        let aps: Vec<(usize, f32)> = self
            .per_class
            .iter()
            .enumerate()
            .filter_map(|(i, acc)| acc.average_precision(interpolation).map(|ap| (i, ap)))
            .collect();
        if !aps.is_empty() {
            let map = aps.iter().map(|(_, ap)| ap).sum::<f32>() / aps.len() as f32;
            report.push("mAP", map);
            let names = self.loader.class_names();
            for (i, ap) in aps {
                report.push(format!("AP_{}", names[i]), ap);
            }
        }
        if self.seg_images > 0 {
            if let Some(miou) = self.confusion.mean_iou() {
                report.push("mIoU", miou);
            }
            if let Some(accuracy) = self.confusion.pixel_accuracy() {
                report.push("pixAcc", accuracy);
            }
        }
        report
    }
}

impl<B: Backend> Evaluator<B> for Evaluation {
    fn reset(&mut self) {
        self.per_class.iter_mut().for_each(|acc| *acc = MatchAccumulator::new());
        self.confusion.reset();
        self.seg_images = 0;
    }

    fn evaluate_network(
        &mut self,
        detector: &mut Detector<B>,
        ckpt: u64,
    ) -> Result<String, EvalError> {
        let loader = Arc::clone(&self.loader);
        let samples = loader.samples();
        if samples.is_empty() {
            return Err(EvalError::EmptyDataset(loader.name().to_string()));
        }
        let options = *detector.options();
        let started = Instant::now();

        for sample in samples {
            let prediction = detector.predict(sample)?;
            if options.detect {
                self.add_detections(sample, &prediction);
            }
            if options.segment && !options.no_gt {
                if let (Some(predicted), Some(mask)) =
                    (&prediction.segmentation, loader.load_segmentation(sample)?)
                {
                    let size = mask.dimensions();
                    self.add_segmentation(sample, predicted, mask.as_raw(), size)?;
                }
            }
        }

        let report = self.report(ckpt);
        tracing::info!(
            ckpt,
            dataset = loader.name(),
            images = samples.len(),
            elapsed = ?started.elapsed(),
            "Evaluated checkpoint"
        );
        Ok(format!("{report}\n"))
    }
}
