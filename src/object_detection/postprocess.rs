// src/object_detection/postprocess.rs

use super::types::ObjectBoundingBox;
use ndarray::ArrayView2;
use std::cmp::Ordering;

/// COCO class names in model output order
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

// Row layout: [cx, cy, w, h, objectness, class0, class1, ...]
const BOX_FIELDS: usize = 5;

pub fn class_id_to_name(class_id: usize) -> String {
    COCO_CLASSES
        .get(class_id)
        .copied()
        .unwrap_or("unknown")
        .to_string()
}

/// Raw network output: a `rows x cols` matrix of predictions
#[derive(Debug, Clone)]
pub struct RawOutput {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

/// Parameters for turning raw predictions into frame-space boxes
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub input_size: f32,
    pub frame_width: f32,
    pub frame_height: f32,
    pub confidence_threshold: f32,
    pub box_padding: f32,
    pub hood_cutoff_y: f32,
}

pub fn decode(output: &RawOutput, params: &DecodeParams) -> Vec<ObjectBoundingBox> {
    let mut detections = Vec::new();

    if output.cols <= BOX_FIELDS || output.rows * output.cols > output.data.len() {
        return detections;
    }

    let view = match ArrayView2::from_shape(
        (output.rows, output.cols),
        &output.data[..output.rows * output.cols],
    ) {
        Ok(view) => view,
        Err(_) => return detections,
    };

    // Network coordinates -> frame coordinates (blob is a plain stretch, no letterbox)
    let scale_x = params.frame_width / params.input_size;
    let scale_y = params.frame_height / params.input_size;

    for row in view.rows() {
        let objectness = row[4];

        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (c, &score) in row.iter().skip(BOX_FIELDS).enumerate() {
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        let confidence = objectness * best_score;
        if confidence < params.confidence_threshold {
            continue;
        }

        let cx = row[0] * scale_x;
        let cy = row[1] * scale_y;
        let w = row[2] * scale_x + params.box_padding;
        let h = row[3] * scale_y + params.box_padding;

        // Ego bonnet
        if cy >= params.hood_cutoff_y {
            continue;
        }

        detections.push(ObjectBoundingBox {
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            confidence,
            class_id: best_class,
            class_name: class_id_to_name(best_class),
        });
    }

    detections
}

/// Highest confidence first; ties broken by position so output order is stable
pub fn sort_by_confidence(detections: &mut [ObjectBoundingBox]) {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.bbox[0].partial_cmp(&b.bbox[0]).unwrap_or(Ordering::Equal))
            .then_with(|| a.bbox[1].partial_cmp(&b.bbox[1]).unwrap_or(Ordering::Equal))
    });
}

pub fn nms(mut detections: Vec<ObjectBoundingBox>, iou_threshold: f32) -> Vec<ObjectBoundingBox> {
    if detections.is_empty() {
        return detections;
    }

    sort_by_confidence(&mut detections);

    let mut keep: Vec<ObjectBoundingBox> = Vec::new();

    for det in detections {
        if keep
            .iter()
            .all(|kept| calculate_iou(&kept.bbox, &det.bbox) < iou_threshold)
        {
            keep.push(det);
        }
    }

    keep
}

pub fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let intersection = intersection_area(box1, box2);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

pub fn intersection_area(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DecodeParams {
        DecodeParams {
            input_size: 320.0,
            frame_width: 640.0,
            frame_height: 320.0,
            confidence_threshold: 0.4,
            box_padding: 0.0,
            hood_cutoff_y: 300.0,
        }
    }

    fn row(cx: f32, cy: f32, w: f32, h: f32, obj: f32, class: usize, score: f32) -> Vec<f32> {
        let mut r = vec![cx, cy, w, h, obj];
        let mut scores = vec![0.0; 80];
        scores[class] = score;
        r.extend(scores);
        r
    }

    fn output(rows: Vec<Vec<f32>>) -> RawOutput {
        let cols = rows[0].len();
        RawOutput {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        }
    }

    #[test]
    fn test_decode_scales_to_frame() {
        let out = output(vec![row(160.0, 100.0, 20.0, 10.0, 0.9, 2, 0.9)]);
        let dets = decode(&out, &params());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_name, "car");
        assert_eq!(dets[0].bbox, [300.0, 95.0, 340.0, 105.0]);
        assert!((dets[0].confidence - 0.81).abs() < 1e-6);
    }

    #[test]
    fn test_decode_filters_low_confidence_and_hood() {
        let out = output(vec![
            row(160.0, 100.0, 20.0, 10.0, 0.5, 2, 0.5), // 0.25 < 0.4
            row(160.0, 310.0, 20.0, 10.0, 0.9, 7, 0.9), // bonnet
        ]);
        assert!(decode(&out, &params()).is_empty());
    }

    #[test]
    fn test_nms_keeps_highest_confidence() {
        let a = ObjectBoundingBox {
            bbox: [0.0, 0.0, 10.0, 10.0],
            confidence: 0.6,
            class_id: 2,
            class_name: "car".into(),
        };
        let b = ObjectBoundingBox {
            bbox: [1.0, 1.0, 11.0, 11.0],
            confidence: 0.9,
            ..a.clone()
        };
        let c = ObjectBoundingBox {
            bbox: [50.0, 50.0, 60.0, 60.0],
            confidence: 0.5,
            ..a.clone()
        };

        let kept = nms(vec![a, b.clone(), c.clone()], 0.4);
        assert_eq!(kept, vec![b, c]);
    }

    #[test]
    fn test_iou_of_disjoint_boxes_is_zero() {
        assert_eq!(
            calculate_iou(&[0.0, 0.0, 1.0, 1.0], &[2.0, 2.0, 3.0, 3.0]),
            0.0
        );
    }
}
