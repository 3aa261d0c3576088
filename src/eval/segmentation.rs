/// Label value excluded from scoring (object boundaries in VOC masks).
pub const IGNORE_LABEL: u8 = 255;

/// Pixel confusion counts, rows indexed by ground truth.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    num_labels: usize,
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    /// `num_labels` includes background.
    pub fn new(num_labels: usize) -> Self {
        ConfusionMatrix {
            num_labels,
            counts: vec![0; num_labels * num_labels],
        }
    }

    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    /// Accumulate one image; both buffers must have the same length. Pixels
    /// labeled [`IGNORE_LABEL`] or out of range in the ground truth are
    /// skipped.
    pub fn add(&mut self, ground_truth: &[u8], prediction: &[u8]) {
        debug_assert_eq!(ground_truth.len(), prediction.len());
        for (&gt, &pred) in ground_truth.iter().zip(prediction) {
            let (gt, pred) = (gt as usize, pred as usize);
            if gt == IGNORE_LABEL as usize || gt >= self.num_labels || pred >= self.num_labels {
                continue;
            }
            self.counts[gt * self.num_labels + pred] += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Per-label IoU; `None` for labels absent from both ground truth and
    /// prediction.
    pub fn iou_per_label(&self) -> Vec<Option<f32>> {
        let n = self.num_labels;
        (0..n)
            .map(|k| {
                let tp = self.counts[k * n + k];
                let gt: u64 = self.counts[k * n..(k + 1) * n].iter().sum();
                let pred: u64 = (0..n).map(|r| self.counts[r * n + k]).sum();
                let union = gt + pred - tp;
                (union > 0).then(|| tp as f32 / union as f32)
            })
            .collect()
    }

    /// Mean IoU over labels that occur; `None` before any pixel is counted.
    pub fn mean_iou(&self) -> Option<f32> {
        let ious: Vec<f32> = self.iou_per_label().into_iter().flatten().collect();
        if ious.is_empty() {
            None
        } else {
            Some(ious.iter().sum::<f32>() / ious.len() as f32)
        }
    }

    pub fn pixel_accuracy(&self) -> Option<f32> {
        let total = self.total();
        let correct: u64 = (0..self.num_labels)
            .map(|k| self.counts[k * self.num_labels + k])
            .sum();
        (total > 0).then(|| correct as f32 / total as f32)
    }
}
