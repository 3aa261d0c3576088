use std::cmp::Ordering;

use crate::dataset::GtObject;
use crate::detector::Detection;

/// How a precision/recall curve is summarized into one number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// VOC2007: mean precision at recall 0.0, 0.1, ..., 1.0.
    ElevenPoint,
    /// VOC2010+: area under the monotone precision envelope.
    AllPoint,
    /// COCO: mean envelope precision at 101 recall thresholds.
    Recall101,
}

/// Scored hits of one class at one IoU threshold, accumulated image by image.
#[derive(Debug, Clone, Default)]
pub struct MatchAccumulator {
    hits: Vec<(f32, bool)>,
    num_gt: usize,
}

impl MatchAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Greedily match one image's detections of `class` against its ground
    /// truth, highest score first.
    ///
    /// A detection overlapping an ignored object counts neither way; a
    /// second detection of an already matched object is a false positive.
    pub fn add_image(
        &mut self,
        detections: &[Detection],
        ground_truth: &[GtObject],
        class: usize,
        iou_thresh: f32,
    ) {
        let gt: Vec<&GtObject> = ground_truth.iter().filter(|o| o.class == class).collect();
        self.num_gt += gt.iter().filter(|o| !o.ignore).count();

        let mut dets: Vec<&Detection> = detections.iter().filter(|d| d.class == class).collect();
        dets.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let mut matched = vec![false; gt.len()];
        for det in dets {
            let best = gt
                .iter()
                .enumerate()
                .map(|(i, o)| (i, det.bbox.iou(&o.bbox)))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
            match best {
                Some((i, iou)) if iou >= iou_thresh => {
                    if gt[i].ignore {
                        continue;
                    }
                    let hit = !matched[i];
                    matched[i] = true;
                    self.hits.push((det.score, hit));
                }
                _ => self.hits.push((det.score, false)),
            }
        }
    }

    /// Cumulative `(recall, precision)` over hits in descending score order.
    pub fn precision_recall(&self) -> (Vec<f32>, Vec<f32>) {
        let mut hits = self.hits.clone();
        hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        let mut recall = Vec::with_capacity(hits.len());
        let mut precision = Vec::with_capacity(hits.len());
        let (mut tp, mut fp) = (0usize, 0usize);
        for (_, hit) in hits {
            if hit {
                tp += 1;
            } else {
                fp += 1;
            }
            recall.push(if self.num_gt > 0 {
                tp as f32 / self.num_gt as f32
            } else {
                0.0
            });
            precision.push(tp as f32 / (tp + fp) as f32);
        }
        (recall, precision)
    }

    /// `None` when the class has no ground truth.
    pub fn average_precision(&self, interpolation: Interpolation) -> Option<f32> {
        if self.num_gt == 0 {
            return None;
        }
        let (recall, precision) = self.precision_recall();
        Some(average_precision(&recall, &precision, interpolation))
    }
}

/// Summarize a precision/recall curve. `recall` must be non-decreasing.
pub fn average_precision(recall: &[f32], precision: &[f32], interpolation: Interpolation) -> f32 {
    match interpolation {
        Interpolation::ElevenPoint => {
            let total: f32 = (0..=10)
                .map(|t| {
                    let t = t as f32 / 10.0;
                    recall
                        .iter()
                        .zip(precision)
                        .filter(|(r, _)| **r >= t)
                        .map(|(_, p)| *p)
                        .fold(0.0, f32::max)
                })
                .sum();
            total / 11.0
        }
        Interpolation::AllPoint => {
            let mut mrec = Vec::with_capacity(recall.len() + 2);
            mrec.push(0.0);
            mrec.extend_from_slice(recall);
            mrec.push(1.0);
            let mut mpre = Vec::with_capacity(precision.len() + 2);
            mpre.push(0.0);
            mpre.extend_from_slice(precision);
            mpre.push(0.0);
            envelope(&mut mpre);

            mrec.windows(2)
                .zip(&mpre[1..])
                .filter(|(r, _)| r[1] != r[0])
                .map(|(r, p)| (r[1] - r[0]) * p)
                .sum()
        }
        Interpolation::Recall101 => {
            let mut env = precision.to_vec();
            envelope(&mut env);
            let total: f32 = (0..=100)
                .map(|t| {
                    let t = t as f32 / 100.0;
                    let idx = recall.partition_point(|r| *r < t);
                    env.get(idx).copied().unwrap_or(0.0)
                })
                .sum();
            total / 101.0
        }
    }
}

/// Make precision non-increasing from left to right.
fn envelope(precision: &mut [f32]) {
    for i in (1..precision.len()).rev() {
        precision[i - 1] = precision[i - 1].max(precision[i]);
    }
}
