// src/lane_detection/position.rs

use super::types::LineSegment;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LanePosition {
    /// Vehicle x minus lane centre x at the reference row
    pub offset: f32,
    pub lane_width: f32,
    pub turning_required_percentage: i32,
    pub overlay_corners: Option<[(f32, f32); 4]>,
}

/// Locate the vehicle inside its lane at row `reference_y`.
///
/// With only one boundary the other is placed `average_lane_width` away.
/// The camera is assumed to sit on the vehicle's centreline.
pub fn calculate_lane_position(
    left: Option<&LineSegment>,
    right: Option<&LineSegment>,
    frame_width: f32,
    reference_y: f32,
    average_lane_width: Option<f32>,
    turning_rounding: i32,
) -> Option<LanePosition> {
    let left_x = left.and_then(|l| l.x_at_y(reference_y));
    let right_x = right.and_then(|r| r.x_at_y(reference_y));

    let (left_x, right_x) = match (left_x, right_x, average_lane_width) {
        (Some(lx), Some(rx), _) => (lx, rx),
        (Some(lx), None, Some(width)) => (lx, lx + width),
        (None, Some(rx), Some(width)) => (rx - width, rx),
        _ => return None,
    };

    let lane_width = right_x - left_x;
    if lane_width <= 0.0 || !lane_width.is_finite() {
        return None;
    }

    let vehicle_x = frame_width / 2.0;
    let lane_center = (left_x + right_x) / 2.0;
    let offset = vehicle_x - lane_center;

    let overlay_corners = match (left, right) {
        (Some(l), Some(r)) => lane_overlay_corners(l, r, reference_y),
        _ => None,
    };

    Some(LanePosition {
        offset,
        lane_width,
        turning_required_percentage: turning_required(offset, lane_width, turning_rounding),
        overlay_corners,
    })
}

/// Rightward offset needs a leftward correction; clamped to ±100 and
/// truncated toward zero to a multiple of `rounding`.
pub fn turning_required(offset: f32, lane_width: f32, rounding: i32) -> i32 {
    let half_width = lane_width / 2.0;
    if half_width <= 0.0 {
        return 0;
    }

    let percentage = (-offset / half_width * 100.0).clamp(-100.0, 100.0) as i32;
    if rounding <= 1 {
        return percentage;
    }
    percentage / rounding * rounding
}

/// Quadrilateral between the two boundaries, from the higher of their top
/// endpoints down to the reference row. `None` when the lines cross inside it.
fn lane_overlay_corners(
    left: &LineSegment,
    right: &LineSegment,
    bottom_y: f32,
) -> Option<[(f32, f32); 4]> {
    let (left_x0, left_dxdy) = left.x_of_y()?;
    let (right_x0, right_dxdy) = right.x_of_y()?;

    let top_y = left.min_y().min(right.min_y());
    if top_y >= bottom_y {
        return None;
    }

    let x_left = |y: f32| left_x0 + left_dxdy * y;
    let x_right = |y: f32| right_x0 + right_dxdy * y;

    if x_left(top_y) >= x_right(top_y) || x_left(bottom_y) >= x_right(bottom_y) {
        return None;
    }

    Some([
        (x_left(top_y), top_y),
        (x_right(top_y), top_y),
        (x_right(bottom_y), bottom_y),
        (x_left(bottom_y), bottom_y),
    ])
}
