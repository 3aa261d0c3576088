use std::sync::Arc;
use std::time::Instant;

use burn::prelude::Backend;

use crate::dataset::{DatasetLoader, Sample};
use crate::detector::{Detector, Prediction};
use crate::error::EvalError;
use crate::eval::ap::{Interpolation, MatchAccumulator};
use crate::eval::{Evaluator, Report};

/// IoU thresholds 0.50:0.05:0.95.
const NUM_THRESHOLDS: usize = 10;

fn iou_threshold(i: usize) -> f32 {
    0.5 + 0.05 * i as f32
}

/// COCO box protocol: AP averaged over IoU 0.50:0.95 with 101-point
/// interpolation, plus AP at 0.50 and 0.75.
pub struct CocoEval {
    loader: Arc<dyn DatasetLoader>,
    /// `[threshold][class - 1]`
    accumulators: Vec<Vec<MatchAccumulator>>,
}

impl CocoEval {
    pub fn new(loader: Arc<dyn DatasetLoader>) -> Self {
        let num_classes = loader.num_classes();
        CocoEval {
            loader,
            accumulators: vec![vec![MatchAccumulator::new(); num_classes]; NUM_THRESHOLDS],
        }
    }

    pub fn add_detections(&mut self, sample: &Sample, prediction: &Prediction) {
        for (t, per_class) in self.accumulators.iter_mut().enumerate() {
            let thresh = iou_threshold(t);
            for (i, acc) in per_class.iter_mut().enumerate() {
                acc.add_image(&prediction.detections, &sample.objects, i + 1, thresh);
            }
        }
    }

    /// Mean AP over classes with ground truth at threshold index `t`.
    fn mean_ap_at(&self, t: usize) -> Option<f32> {
        let aps: Vec<f32> = self.accumulators[t]
            .iter()
            .filter_map(|acc| acc.average_precision(Interpolation::Recall101))
            .collect();
        (!aps.is_empty()).then(|| aps.iter().sum::<f32>() / aps.len() as f32)
    }

    pub fn report(&self, ckpt: u64) -> Report {
        let mut report = Report::new(ckpt);
        let per_threshold: Vec<f32> = (0..NUM_THRESHOLDS)
            .filter_map(|t| self.mean_ap_at(t))
            .collect();
        if per_threshold.len() == NUM_THRESHOLDS {
            report.push(
                "AP",
                per_threshold.iter().sum::<f32>() / NUM_THRESHOLDS as f32,
            );
            report.push("AP50", per_threshold[0]);
            report.push("AP75", per_threshold[5]);
        }
        report
    }
}

impl<B: Backend> Evaluator<B> for CocoEval {
    fn reset(&mut self) {
        for acc in self.accumulators.iter_mut().flatten() {
            *acc = MatchAccumulator::new();
        }
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
        let started = Instant::now();
        for sample in samples {
            let prediction = detector.predict(sample)?;
            self.add_detections(sample, &prediction);
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
