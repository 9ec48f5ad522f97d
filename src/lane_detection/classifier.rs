// src/lane_detection/classifier.rs
//
// Frame layout (origin top-left):
//
//   left lines: negative slope, left of the centre line
//   right lines: positive slope, right of the centre line
//   middle lines: near-vertical or within the centre band
//     (the forward marking while straddling a line)

use super::types::{LaneLineCategory, LineSegment};
use crate::object_detection::ObjectBoundingBox;

#[derive(Debug, Clone, Copy)]
pub struct ClassifierThresholds {
    /// |slope| below this is a horizontal edge (shadow, bonnet, crossing stripe)
    pub horizontal_gradient: f32,
    /// |slope| at or above this is near-vertical
    pub vertical_gradient: f32,
    /// Half-width of the centre band as a fraction of half the frame width
    pub middle_band_ratio: f32,
}

/// Longest segment seen this frame per category
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryCandidates {
    pub left: Option<LineSegment>,
    pub middle: Option<LineSegment>,
    pub right: Option<LineSegment>,
}

impl CategoryCandidates {
    fn offer(&mut self, category: LaneLineCategory, segment: LineSegment) {
        let slot = match category {
            LaneLineCategory::Left => &mut self.left,
            LaneLineCategory::Middle => &mut self.middle,
            LaneLineCategory::Right => &mut self.right,
        };

        if slot.map_or(true, |current| segment.length() > current.length()) {
            *slot = Some(segment);
        }
    }
}

/// Vehicle body edges and shadows are not road markings
pub fn is_line_within_object_bounding_boxes(
    segment: &LineSegment,
    objects: &[ObjectBoundingBox],
) -> bool {
    objects
        .iter()
        .any(|object| object.intersects_segment(segment.x1, segment.y1, segment.x2, segment.y2))
}

pub fn classify_segment(
    segment: &LineSegment,
    frame_width: f32,
    thresholds: &ClassifierThresholds,
) -> Option<LaneLineCategory> {
    let center_x = frame_width / 2.0;
    let (mid_x, _) = segment.midpoint();
    let position = (mid_x - center_x) / center_x;

    let Some(slope) = segment.slope() else {
        return Some(LaneLineCategory::Middle);
    };

    if slope.abs() < thresholds.horizontal_gradient {
        return None;
    }

    if position.abs() <= thresholds.middle_band_ratio || slope.abs() >= thresholds.vertical_gradient
    {
        return Some(LaneLineCategory::Middle);
    }

    if slope < 0.0 && position < 0.0 {
        Some(LaneLineCategory::Left)
    } else if slope > 0.0 && position > 0.0 {
        Some(LaneLineCategory::Right)
    } else {
        None
    }
}

/// Filter against object boxes, then keep the longest segment per category
pub fn select_candidates(
    segments: &[LineSegment],
    objects: &[ObjectBoundingBox],
    frame_width: f32,
    thresholds: &ClassifierThresholds,
) -> CategoryCandidates {
    let mut candidates = CategoryCandidates::default();

    for segment in segments {
        if is_line_within_object_bounding_boxes(segment, objects) {
            continue;
        }

        if let Some(category) = classify_segment(segment, frame_width, thresholds) {
            candidates.offer(category, *segment);
        }
    }

    candidates
}
