use std::cmp::Ordering;

use crate::detector::boxes::BBox;
use crate::net::BOX_PARAMS;

/// One scored box for a foreground class (`class >= 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class: usize,
    pub score: f32,
    pub bbox: BBox,
}

/// Thresholds applied when turning head outputs into detections.
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub conf_thresh: f32,
    pub nms_thresh: f32,
    pub top_k: usize,
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax_in_place(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}

/// Decode a single image's detection head output.
///
/// `head` is the `[(K + 1) + 4, grid_h, grid_w]` tensor flattened in
/// channel-major order. Boxes are scaled to `image_size = (width, height)`.
pub fn decode_detections(
    head: &[f32],
    num_classes: usize,
    grid: (usize, usize),
    image_size: (u32, u32),
    params: &DecodeParams,
) -> Vec<Detection> {
    let (grid_h, grid_w) = grid;
    let cells = grid_h * grid_w;
    let class_channels = num_classes + 1;
    debug_assert_eq!(head.len(), (class_channels + BOX_PARAMS) * cells);

    let (width, height) = (image_size.0 as f32, image_size.1 as f32);
    let mut candidates = Vec::new();
    let mut probs = vec![0.0f32; class_channels];
    for i in 0..grid_h {
        for j in 0..grid_w {
            let cell = i * grid_w + j;
            for (c, p) in probs.iter_mut().enumerate() {
                *p = head[c * cells + cell];
            }
            softmax_in_place(&mut probs);

            let t = |k: usize| head[(class_channels + k) * cells + cell];
            let cx = (j as f32 + sigmoid(t(0))) / grid_w as f32;
            let cy = (i as f32 + sigmoid(t(1))) / grid_h as f32;
            let bw = sigmoid(t(2));
            let bh = sigmoid(t(3));
            let bbox = BBox::new(
                (cx - bw / 2.0) * width,
                (cy - bh / 2.0) * height,
                (cx + bw / 2.0) * width,
                (cy + bh / 2.0) * height,
            )
            .clamp(width, height);

            // Class 0 is background.
            for (class, &score) in probs.iter().enumerate().skip(1) {
                if score >= params.conf_thresh {
                    candidates.push(Detection { class, score, bbox });
                }
            }
        }
    }

    let mut kept = non_max_suppression(candidates, params.nms_thresh);
    kept.truncate(params.top_k);
    kept
}

/// Greedy per-class NMS. Output is sorted by descending score.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_thresh: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class == det.class && k.bbox.iou(&det.bbox) > iou_thresh);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

/// Per-cell argmax of a `[K + 1, grid_h, grid_w]` segmentation head output.
pub fn decode_segmentation(head: &[f32], num_labels: usize, grid: (usize, usize)) -> Vec<u8> {
    let cells = grid.0 * grid.1;
    (0..cells)
        .map(|cell| {
            let mut best = 0;
            for c in 1..num_labels {
                if head[c * cells + cell] > head[best * cells + cell] {
                    best = c;
                }
            }
            best as u8
        })
        .collect()
}

/// Nearest-neighbour resample of a row-major label map.
pub fn resize_labels(labels: &[u8], from: (usize, usize), to: (usize, usize)) -> Vec<u8> {
    let (src_h, src_w) = from;
    let (dst_h, dst_w) = to;
    let mut out = Vec::with_capacity(dst_h * dst_w);
    for y in 0..dst_h {
        let sy = (y * src_h / dst_h.max(1)).min(src_h.saturating_sub(1));
        for x in 0..dst_w {
            let sx = (x * src_w / dst_w.max(1)).min(src_w.saturating_sub(1));
            out.push(labels[sy * src_w + sx]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class: usize, score: f32, x0: f32) -> Detection {
        Detection {
            class,
            score,
            bbox: BBox::new(x0, 0.0, x0 + 10.0, 10.0),
        }
    }

    #[test]
    fn test_nms_suppresses_overlapping_same_class() {
        let kept = non_max_suppression(vec![det(1, 0.6, 1.0), det(1, 0.9, 0.0)], 0.45);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_other_classes_and_far_boxes() {
        let kept = non_max_suppression(
            vec![det(1, 0.9, 0.0), det(2, 0.8, 0.0), det(1, 0.7, 50.0)],
            0.45,
        );
        assert_eq!(kept.len(), 3);
        assert!(kept.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_decode_single_confident_cell() {
        // 1 foreground class, 1x2 grid: cell 1 is confident, cell 0 is background.
        let cells = 2;
        let mut head = vec![0.0f32; (2 + BOX_PARAMS) * cells];
        head[0] = 10.0; // background logit, cell 0
        head[cells + 1] = 10.0; // class 1 logit, cell 1
        let params = DecodeParams {
            conf_thresh: 0.5,
            nms_thresh: 0.45,
            top_k: 10,
        };

        let dets = decode_detections(&head, 1, (1, 2), (100, 50), &params);
        assert_eq!(dets.len(), 1);
        let d = dets[0];
        assert_eq!(d.class, 1);
        assert!(d.score > 0.99);
        // Zero offsets: centre of cell 1, half the image in each dimension.
        assert!((d.bbox.x0 - 50.0).abs() < 1e-3);
        assert!((d.bbox.x1 - 100.0).abs() < 1e-3);
        assert!((d.bbox.y0 - 12.5).abs() < 1e-3);
        assert!((d.bbox.y1 - 37.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_respects_top_k() {
        let cells = 4;
        let mut head = vec![0.0f32; (3 + BOX_PARAMS) * cells];
        for cell in 0..cells {
            head[cells + cell] = 5.0;
            head[2 * cells + cell] = 5.0;
        }
        let params = DecodeParams {
            conf_thresh: 0.1,
            nms_thresh: 1.0,
            top_k: 3,
        };
        assert_eq!(decode_detections(&head, 2, (2, 2), (64, 64), &params).len(), 3);
    }

    #[test]
    fn test_decode_segmentation_argmax() {
        // 3 labels over 2 cells.
        let head = [0.1, 0.0, 0.9, 0.2, 0.5, 0.7];
        assert_eq!(decode_segmentation(&head, 3, (1, 2)), vec![1, 2]);
    }

    #[test]
    fn test_resize_labels_nearest() {
        let labels = [1, 2, 3, 4];
        let up = resize_labels(&labels, (2, 2), (4, 4));
        assert_eq!(
            up,
            vec![1, 1, 2, 2, 1, 1, 2, 2, 3, 3, 4, 4, 3, 3, 4, 4]
        );
    }
}
