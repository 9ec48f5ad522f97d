// src/object_detection/blob_merge.rs
//
// Consolidates nearby detections into blobs. Runs after NMS, so the inputs
// are already distinct predictions; this pass joins fragments of the same
// physical obstacle (cab + trailer, occluded halves) into one line mask.

use super::config::BlobSize;
use super::postprocess::{intersection_area, sort_by_confidence};
use super::types::ObjectBoundingBox;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct MergeThresholds {
    /// Minimum intersection / smaller-area ratio
    pub overlap_ratio: f32,
    /// Edge gap in pixels below which boxes merge
    pub max_gap: f32,
}

impl MergeThresholds {
    pub fn for_blob_size(blob_size: BlobSize, frame_width: f32) -> Self {
        Self {
            overlap_ratio: blob_size.merge_overlap_threshold(),
            max_gap: blob_size.merge_gap_ratio() * frame_width,
        }
    }
}

/// Merge until no pair satisfies the thresholds
pub fn merge_blobs(
    mut detections: Vec<ObjectBoundingBox>,
    thresholds: MergeThresholds,
) -> Vec<ObjectBoundingBox> {
    let initial = detections.len();
    if initial < 2 {
        return detections;
    }

    sort_by_confidence(&mut detections);

    loop {
        let Some((i, j)) = find_merge_pair(&detections, thresholds) else {
            break;
        };

        // j > i, so removing j leaves index i valid
        let other = detections.remove(j);
        detections[i] = merge_detections(&detections[i], &other);
    }

    sort_by_confidence(&mut detections);

    if detections.len() < initial {
        debug!(
            "Merged {} detections into {} blobs",
            initial,
            detections.len()
        );
    }

    detections
}

fn find_merge_pair(
    detections: &[ObjectBoundingBox],
    thresholds: MergeThresholds,
) -> Option<(usize, usize)> {
    for i in 0..detections.len() {
        for j in (i + 1)..detections.len() {
            if should_merge(&detections[i], &detections[j], thresholds) {
                return Some((i, j));
            }
        }
    }
    None
}

fn should_merge(a: &ObjectBoundingBox, b: &ObjectBoundingBox, thresholds: MergeThresholds) -> bool {
    let smaller_area = a.area().min(b.area());
    if smaller_area > 0.0 {
        let overlap = intersection_area(&a.bbox, &b.bbox) / smaller_area;
        if overlap >= thresholds.overlap_ratio {
            return true;
        }
    }

    edge_gap(a, b) < thresholds.max_gap
}

/// Largest axis separation between two boxes; 0 when they touch or overlap
fn edge_gap(a: &ObjectBoundingBox, b: &ObjectBoundingBox) -> f32 {
    let gap_x = (b.bbox[0] - a.bbox[2]).max(a.bbox[0] - b.bbox[2]).max(0.0);
    let gap_y = (b.bbox[1] - a.bbox[3]).max(a.bbox[1] - b.bbox[3]).max(0.0);
    gap_x.max(gap_y)
}

/// Union box; label and confidence come from the more confident detection
fn merge_detections(a: &ObjectBoundingBox, b: &ObjectBoundingBox) -> ObjectBoundingBox {
    let bbox = [
        a.bbox[0].min(b.bbox[0]),
        a.bbox[1].min(b.bbox[1]),
        a.bbox[2].max(b.bbox[2]),
        a.bbox[3].max(b.bbox[3]),
    ];

    let primary = if a.confidence >= b.confidence { a } else { b };

    ObjectBoundingBox {
        bbox,
        confidence: primary.confidence,
        class_id: primary.class_id,
        class_name: primary.class_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4], confidence: f32) -> ObjectBoundingBox {
        ObjectBoundingBox {
            bbox,
            confidence,
            class_id: 7,
            class_name: "truck".to_string(),
        }
    }

    #[test]
    fn test_tightest_keeps_separate_boxes() {
        let thresholds = MergeThresholds::for_blob_size(BlobSize::One, 1000.0);
        let boxes = vec![
            det([0.0, 0.0, 100.0, 100.0], 0.9),
            det([105.0, 0.0, 200.0, 100.0], 0.8),
        ];
        assert_eq!(merge_blobs(boxes, thresholds).len(), 2);
    }

    #[test]
    fn test_aggressive_joins_nearby_boxes() {
        let thresholds = MergeThresholds::for_blob_size(BlobSize::Five, 1000.0);
        let boxes = vec![
            det([0.0, 0.0, 100.0, 100.0], 0.9),
            det([105.0, 0.0, 200.0, 100.0], 0.8),
        ];
        let merged = merge_blobs(boxes, thresholds);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].bbox, [0.0, 0.0, 200.0, 100.0]);
        assert_eq!(merged[0].confidence, 0.9);
    }

    #[test]
    fn test_contained_box_merges_even_at_tightest() {
        let thresholds = MergeThresholds::for_blob_size(BlobSize::One, 1000.0);
        let boxes = vec![
            det([0.0, 0.0, 100.0, 100.0], 0.5),
            det([10.0, 10.0, 50.0, 50.0], 0.7),
        ];
        let merged = merge_blobs(boxes, thresholds);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].bbox, [0.0, 0.0, 100.0, 100.0]);
        assert_eq!(merged[0].confidence, 0.7);
    }

    #[test]
    fn test_merging_reaches_fixed_point() {
        // a and c are far apart; only the chain through b joins them
        let thresholds = MergeThresholds::for_blob_size(BlobSize::Three, 1000.0);
        let boxes = vec![
            det([0.0, 0.0, 100.0, 100.0], 0.9),
            det([115.0, 0.0, 200.0, 100.0], 0.8),
            det([215.0, 0.0, 300.0, 100.0], 0.7),
            det([800.0, 800.0, 900.0, 900.0], 0.6),
        ];
        let merged = merge_blobs(boxes, thresholds);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].bbox, [0.0, 0.0, 300.0, 100.0]);

        // No remaining pair qualifies
        assert!(find_merge_pair(&merged, thresholds).is_none());
    }

    #[test]
    fn test_merging_is_deterministic() {
        let thresholds = MergeThresholds::for_blob_size(BlobSize::Four, 640.0);
        let boxes = vec![
            det([10.0, 10.0, 40.0, 40.0], 0.8),
            det([42.0, 12.0, 80.0, 45.0], 0.8),
            det([300.0, 300.0, 340.0, 330.0], 0.4),
        ];
        let first = merge_blobs(boxes.clone(), thresholds);
        let second = merge_blobs(boxes, thresholds);
        assert_eq!(first, second);
    }
}
