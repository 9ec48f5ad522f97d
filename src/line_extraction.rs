// src/line_extraction.rs
//
// RGB frame → grayscale → trapezoid ROI → Canny → probabilistic Hough →
// drop segments traced along the ROI sides.

use crate::lane_detection::LineSegment;
use crate::types::Frame;
use anyhow::{Context, Result};
use opencv::{
    core::{self, Mat, Point, Scalar, Vector},
    imgproc,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineExtractionConfig {
    // ROI trapezoid, as fractions of frame height / width
    pub roi_top_ratio: f32,
    pub roi_bottom_ratio: f32,
    pub roi_top_width_ratio: f32,
    pub roi_bottom_width_ratio: f32,

    pub canny_low_threshold: f64,
    pub canny_high_threshold: f64,

    pub hough_rho: f64,
    pub hough_theta: f64,
    pub hough_threshold: i32,
    pub hough_min_line_length: f64,
    pub hough_max_line_gap: f64,

    /// Segments within this distance (px) of a slanted ROI side, or outside
    /// it, are mask edges rather than road markings
    pub mask_edge_tolerance: f32,
}

impl Default for LineExtractionConfig {
    fn default() -> Self {
        Self {
            roi_top_ratio: 0.61,          // 660 / 1080
            roi_bottom_ratio: 0.78,       // 840 / 1080
            roi_top_width_ratio: 0.10,    // 200 / 1920
            roi_bottom_width_ratio: 0.47, // 900 / 1920
            canny_low_threshold: 128.0,
            canny_high_threshold: 255.0,
            hough_rho: 1.0,
            hough_theta: std::f64::consts::PI / 180.0,
            hough_threshold: 32,
            hough_min_line_length: 16.0,
            hough_max_line_gap: 8.0,
            mask_edge_tolerance: 2.0,
        }
    }
}

impl LineExtractionConfig {
    /// Trapezoid corners (top-left, top-right, bottom-right, bottom-left),
    /// centred horizontally.
    pub fn roi_polygon(&self, width: usize, height: usize) -> [(i32, i32); 4] {
        let w = width as f32;
        let h = height as f32;
        let center = w / 2.0;
        let top = (h * self.roi_top_ratio).round() as i32;
        let bottom = (h * self.roi_bottom_ratio).round() as i32;
        let top_half = w * self.roi_top_width_ratio / 2.0;
        let bottom_half = w * self.roi_bottom_width_ratio / 2.0;

        [
            ((center - top_half).round() as i32, top),
            ((center + top_half).round() as i32, top),
            ((center + bottom_half).round() as i32, bottom),
            ((center - bottom_half).round() as i32, bottom),
        ]
    }
}

/// Signed distance of a point from one ROI side, positive toward the
/// inside of the polygon
struct MaskSide {
    origin: (f32, f32),
    normal: (f32, f32),
}

impl MaskSide {
    fn new(from: (i32, i32), to: (i32, i32), inside: (f32, f32)) -> Option<Self> {
        let origin = (from.0 as f32, from.1 as f32);
        let (dx, dy) = (to.0 as f32 - origin.0, to.1 as f32 - origin.1);
        let length = dx.hypot(dy);
        if length < f32::EPSILON {
            return None;
        }

        let mut side = Self {
            origin,
            normal: (-dy / length, dx / length),
        };
        if side.distance(inside.0, inside.1) < 0.0 {
            side.normal = (-side.normal.0, -side.normal.1);
        }
        Some(side)
    }

    fn distance(&self, x: f32, y: f32) -> f32 {
        (x - self.origin.0) * self.normal.0 + (y - self.origin.1) * self.normal.1
    }

    fn traces(&self, segment: &LineSegment, tolerance: f32) -> bool {
        self.distance(segment.x1, segment.y1) <= tolerance
            && self.distance(segment.x2, segment.y2) <= tolerance
    }
}

/// Remove segments whose both endpoints lie on, or outside, the left or
/// right side of `polygon` (as returned by `roi_polygon`).
pub fn remove_mask_edges(
    segments: Vec<LineSegment>,
    polygon: &[(i32, i32); 4],
    tolerance: f32,
) -> Vec<LineSegment> {
    let inside = (
        polygon.iter().map(|p| p.0 as f32).sum::<f32>() / 4.0,
        polygon.iter().map(|p| p.1 as f32).sum::<f32>() / 4.0,
    );
    let sides: Vec<MaskSide> = [(polygon[0], polygon[3]), (polygon[1], polygon[2])]
        .into_iter()
        .filter_map(|(from, to)| MaskSide::new(from, to, inside))
        .collect();

    segments
        .into_iter()
        .filter(|segment| !sides.iter().any(|side| side.traces(segment, tolerance)))
        .collect()
}

pub struct LineExtractor {
    config: LineExtractionConfig,
}

impl LineExtractor {
    pub fn new(config: LineExtractionConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, frame: &Frame) -> Result<Vec<LineSegment>> {
        let mat = Mat::from_slice(frame.data.as_slice())
            .context("frame buffer is not a valid Mat")?;
        let mat = mat.reshape(3, frame.height as i32)?;

        // 1. Grayscale
        let mut gray = Mat::default();
        imgproc::cvt_color(&mat, &mut gray, imgproc::COLOR_RGB2GRAY, 0)?;

        // 2. ROI mask
        let mut mask = Mat::new_rows_cols_with_default(
            frame.height as i32,
            frame.width as i32,
            core::CV_8UC1,
            Scalar::all(0.0),
        )?;
        let corners = self.config.roi_polygon(frame.width, frame.height);
        let polygon: Vector<Point> = corners.iter().map(|&(x, y)| Point::new(x, y)).collect();
        imgproc::fill_convex_poly(&mut mask, &polygon, Scalar::all(255.0), imgproc::LINE_8, 0)?;

        let mut roi = Mat::default();
        core::bitwise_and(&gray, &mask, &mut roi, &core::no_array())?;

        // 3. Edges
        let mut edges = Mat::default();
        imgproc::canny(
            &roi,
            &mut edges,
            self.config.canny_low_threshold,
            self.config.canny_high_threshold,
            3,
            false,
        )?;

        // 4. Segments
        let mut lines = Vector::<core::Vec4i>::new();
        imgproc::hough_lines_p(
            &edges,
            &mut lines,
            self.config.hough_rho,
            self.config.hough_theta,
            self.config.hough_threshold,
            self.config.hough_min_line_length,
            self.config.hough_max_line_gap,
        )?;

        let segments: Vec<LineSegment> = lines
            .iter()
            .map(|l| LineSegment::new(l[0] as f32, l[1] as f32, l[2] as f32, l[3] as f32))
            .collect();
        let found = segments.len();

        // 5. Mask sides
        let segments = remove_mask_edges(segments, &corners, self.config.mask_edge_tolerance);

        debug!(
            "Extracted {} line segments ({} on mask edges)",
            segments.len(),
            found - segments.len()
        );
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lane_detection::{LaneDetector, LaneDetectorConfig};

    const FULL_HD: (usize, usize) = (1920, 1080);

    fn full_hd_roi() -> [(i32, i32); 4] {
        LineExtractionConfig::default().roi_polygon(FULL_HD.0, FULL_HD.1)
    }

    fn segment(from: (i32, i32), to: (i32, i32)) -> LineSegment {
        LineSegment::new(from.0 as f32, from.1 as f32, to.0 as f32, to.1 as f32)
    }

    #[test]
    fn test_default_roi_matches_full_hd_mask() {
        let polygon = LineExtractionConfig::default().roi_polygon(1920, 1080);
        assert_eq!(polygon[0], (864, 659));
        assert_eq!(polygon[1], (1056, 659));
        assert_eq!(polygon[2], (1411, 842));
        assert_eq!(polygon[3], (509, 842));
    }

    #[test]
    fn test_roi_is_symmetric() {
        let polygon = LineExtractionConfig::default().roi_polygon(1000, 600);
        let center = 500;
        assert_eq!(center - polygon[0].0, polygon[1].0 - center);
        assert_eq!(center - polygon[3].0, polygon[2].0 - center);
        assert!(polygon[0].1 < polygon[3].1);
    }

    #[test]
    fn test_mask_sides_are_removed() {
        let roi = full_hd_roi();
        let marking = LineSegment::new(700.0, 820.0, 760.0, 780.0);
        let segments = vec![
            segment(roi[3], roi[0]),
            segment(roi[1], roi[2]),
            // Hough rarely lands exactly on the side
            LineSegment::new(520.0, 837.0, 600.0, 795.5),
            marking,
        ];

        let kept = remove_mask_edges(segments, &roi, 2.0);
        assert_eq!(kept, vec![marking]);
    }

    #[test]
    fn test_mask_edge_is_not_reported_as_left_line() {
        let roi = full_hd_roi();
        let marking = LineSegment::new(700.0, 820.0, 760.0, 780.0);
        let segments = vec![segment(roi[3], roi[0]), segment(roi[1], roi[2]), marking];

        let kept = remove_mask_edges(segments, &roi, 2.0);
        let mut detector = LaneDetector::new(LaneDetectorConfig::default()).unwrap();
        let info = detector.run(&kept, FULL_HD.0, FULL_HD.1, &[]).unwrap();

        assert_eq!(info.left_line.unwrap().segment, marking);
        assert!(info.right_line.is_none());
    }

    #[test]
    fn test_segments_inside_roi_are_kept() {
        let roi = full_hd_roi();
        // Parallel to the left side, a few pixels in
        let inner = LineSegment::new(515.0, 842.0, 870.0, 659.0);
        assert_eq!(remove_mask_edges(vec![inner], &roi, 2.0), vec![inner]);
        // One endpoint on the side is not enough
        let crossing = LineSegment::new(509.0, 842.0, 700.0, 800.0);
        assert_eq!(remove_mask_edges(vec![crossing], &roi, 2.0), vec![crossing]);
    }

    #[test]
    fn test_uniform_frame_yields_no_boundaries() {
        let (width, height) = FULL_HD;
        let frame = Frame::new(vec![200; width * height * 3], width, height, 0.0);
        let extractor = LineExtractor::new(LineExtractionConfig::default());

        let segments = extractor.extract(&frame).unwrap();
        let mut detector = LaneDetector::new(LaneDetectorConfig::default()).unwrap();
        let info = detector.run(&segments, width, height, &[]).unwrap();

        assert!(info.left_line.is_none());
        assert!(info.right_line.is_none());
    }
}
