// src/pipeline/orchestrator.rs
//
// Per-frame fusion:
//
//   frame ─┬─ object detection ──┐
//          └─ line extraction  ──┴─ join ─ lane detector ─ FrameResult
//
// Lane state only advances after both branches succeed.

use super::frame_context::FrameResult;
use super::metrics::PipelineMetrics;
use crate::error::DetectorError;
use crate::lane_detection::{LaneDetector, LineSegment};
use crate::object_detection::ObjectDetector;
use crate::types::Frame;
use anyhow::{Context, Result};
use std::time::Instant;
use tracing::debug;

pub struct PerceptionPipeline {
    object_detector: ObjectDetector,
    lane_detector: LaneDetector,
    metrics: PipelineMetrics,
    frame_index: u64,
}

impl PerceptionPipeline {
    pub fn new(object_detector: ObjectDetector, lane_detector: LaneDetector) -> Self {
        Self {
            object_detector,
            lane_detector,
            metrics: PipelineMetrics::new(),
            frame_index: 0,
        }
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn object_detector(&self) -> &ObjectDetector {
        &self.object_detector
    }

    pub fn lane_detector(&self) -> &LaneDetector {
        &self.lane_detector
    }

    /// Begin a new video stream: fresh lane state, metrics and frame numbering.
    /// The object detector and its backend session are kept.
    pub fn start_stream(&mut self, lane_detector: LaneDetector) {
        self.lane_detector = lane_detector;
        self.metrics = PipelineMetrics::new();
        self.frame_index = 0;
    }

    /// Run detection and `extract` concurrently on `frame`, then fuse.
    ///
    /// On error nothing carried across frames is modified.
    pub fn process_frame<F>(&mut self, frame: &Frame, extract: F) -> Result<FrameResult>
    where
        F: FnOnce(&Frame) -> Result<Vec<LineSegment>> + Send,
    {
        let frame_index = self.frame_index;
        self.frame_index += 1;
        self.metrics.inc(&self.metrics.total_frames);

        if !frame.is_valid() {
            self.metrics.inc(&self.metrics.failed_frames);
            return Err(DetectorError::InvalidFrame {
                width: frame.width,
                height: frame.height,
            }
            .into());
        }

        let object_detector = &mut self.object_detector;

        // 1. Detection and extraction in parallel
        let ((objects, detection_us), (segments, extraction_us)) = rayon::join(
            || {
                let start = Instant::now();
                let objects = object_detector.detect(frame);
                (objects, start.elapsed().as_micros() as u64)
            },
            || {
                let start = Instant::now();
                let segments = extract(frame);
                (segments, start.elapsed().as_micros() as u64)
            },
        );

        self.metrics
            .set_timing(&self.metrics.detection_time_us, detection_us);
        self.metrics
            .set_timing(&self.metrics.extraction_time_us, extraction_us);

        // 2. Join barrier: both must succeed before the lane state moves
        let (objects, segments) = match (objects, segments) {
            (Ok(objects), Ok(segments)) => (objects, segments),
            (Err(e), _) => {
                self.metrics.inc(&self.metrics.failed_frames);
                return Err(e)
                    .with_context(|| format!("object detection failed on frame {}", frame_index));
            }
            (_, Err(e)) => {
                self.metrics.inc(&self.metrics.failed_frames);
                return Err(e)
                    .with_context(|| format!("line extraction failed on frame {}", frame_index));
            }
        };

        // 3. Lane classification + driving state
        let was_changing = self.lane_detector.driving_state().is_changing();
        let start = Instant::now();
        let lanes = self
            .lane_detector
            .run(&segments, frame.width, frame.height, &objects)?
            .clone();
        self.metrics
            .set_timing(&self.metrics.lane_time_us, start.elapsed().as_micros() as u64);

        let result = FrameResult {
            frame_index,
            timestamp_ms: frame.timestamp_ms,
            objects,
            lanes,
        };

        if result.has_lanes() {
            self.metrics.inc(&self.metrics.frames_with_lanes);
        }
        if !result.objects.is_empty() {
            self.metrics.inc(&self.metrics.frames_with_objects);
        }
        if !was_changing && result.is_changing_lanes() {
            self.metrics.inc(&self.metrics.lane_changes_detected);
        }

        debug!(
            "Frame {}: {} segments, {} objects, {} lanes ({}us detect, {}us extract)",
            frame_index,
            segments.len(),
            result.objects.len(),
            result.lanes.line_count(),
            detection_us,
            extraction_us
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lane_detection::{DrivingStateConfig, LaneDetectorConfig};
    use crate::object_detection::detector::tests::{prediction, FakeBackend};
    use crate::object_detection::{BlobSize, ModelVariant, ObjectDetectorConfig};
    use anyhow::anyhow;
    use std::sync::atomic::Ordering;

    const WIDTH: usize = 100;
    const HEIGHT: usize = 60;

    fn frame() -> Frame {
        Frame::new(vec![0; WIDTH * HEIGHT * 3], WIDTH, HEIGHT, 33.3)
    }

    fn segments() -> Vec<LineSegment> {
        shifted_segments(0.0)
    }

    /// Lane boundaries moved `shift` px to the left
    fn shifted_segments(shift: f32) -> Vec<LineSegment> {
        vec![
            LineSegment::new(20.0 - shift, 60.0, 40.0 - shift, 40.0),
            LineSegment::new(60.0 - shift, 40.0, 80.0 - shift, 60.0),
        ]
    }

    fn pipeline(rows: Vec<Vec<f32>>) -> PerceptionPipeline {
        let config = ObjectDetectorConfig {
            model_variant: ModelVariant::Tiny,
            blob_size: BlobSize::One,
            box_padding: 0.0,
            hood_cutoff_ratio: 1.0,
            ..Default::default()
        };
        let detector = ObjectDetector::with_backend(config, Box::new(FakeBackend::new(rows)))
            .unwrap();
        let lanes = LaneDetector::new(LaneDetectorConfig::default()).unwrap();
        PerceptionPipeline::new(detector, lanes)
    }

    #[test]
    fn test_frame_result_fuses_objects_and_lanes() {
        let mut pipeline = pipeline(Vec::new());
        let result = pipeline.process_frame(&frame(), |_| Ok(segments())).unwrap();

        assert_eq!(result.frame_index, 0);
        assert_eq!(result.timestamp_ms, 33.3);
        assert!(result.objects.is_empty());
        assert!(result.lanes.left_line.is_some());
        assert!(result.lanes.right_line.is_some());

        let summary = pipeline.metrics().summary();
        assert_eq!(summary.total_frames, 1);
        assert_eq!(summary.frames_with_lanes, 1);
        assert_eq!(summary.frames_with_objects, 0);
    }

    #[test]
    fn test_detected_object_filters_lane_line() {
        // Box over the left half of a 288 px blob, i.e. the left half of the frame
        let rows = vec![prediction(72.0, 144.0, 144.0, 288.0, 2, 0.9)];
        let mut pipeline = pipeline(rows);
        let result = pipeline.process_frame(&frame(), |_| Ok(segments())).unwrap();

        assert_eq!(result.objects.len(), 1);
        assert!(result.lanes.left_line.is_none());
        assert!(result.lanes.right_line.is_some());
        assert_eq!(
            pipeline.metrics().frames_with_objects.load(Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn test_failed_extraction_leaves_lane_state_untouched() {
        let mut pipeline = pipeline(Vec::new());
        pipeline.process_frame(&frame(), |_| Ok(segments())).unwrap();
        let before = pipeline.lane_detector().information().clone();

        let err = pipeline
            .process_frame(&frame(), |_| Err(anyhow!("camera glitch")))
            .unwrap_err();
        assert!(err.to_string().contains("line extraction failed"));
        assert_eq!(*pipeline.lane_detector().information(), before);
        assert_eq!(pipeline.metrics().summary().failed_frames, 1);

        // Next good frame continues from the committed state
        let result = pipeline.process_frame(&frame(), |_| Ok(segments())).unwrap();
        assert_eq!(result.frame_index, 2);
        assert_eq!(result.lanes.frame_index, 1);
    }

    #[test]
    fn test_start_stream_resets_numbering_and_metrics() {
        let mut pipeline = pipeline(Vec::new());
        pipeline.process_frame(&frame(), |_| Ok(segments())).unwrap();
        pipeline.process_frame(&frame(), |_| Ok(segments())).unwrap();

        pipeline.start_stream(LaneDetector::new(LaneDetectorConfig::default()).unwrap());
        assert_eq!(pipeline.metrics().summary().total_frames, 0);

        let result = pipeline.process_frame(&frame(), |_| Ok(segments())).unwrap();
        assert_eq!(result.frame_index, 0);
        assert_eq!(result.lanes.frame_index, 0);
    }

    #[test]
    fn test_lane_change_is_counted_once() {
        let mut pipeline = pipeline(Vec::new());
        pipeline.start_stream(
            LaneDetector::new(LaneDetectorConfig {
                driving_state: DrivingStateConfig {
                    confirm_frames: 1,
                    ..Default::default()
                },
                ..Default::default()
            })
            .unwrap(),
        );

        let result = pipeline.process_frame(&frame(), |_| Ok(segments())).unwrap();
        assert!(result.has_lanes());
        assert!(!result.is_changing_lanes());

        // Keeps drifting, so the change does not settle in between
        for shift in [5.0, 10.0] {
            let result = pipeline
                .process_frame(&frame(), |_| Ok(shifted_segments(shift)))
                .unwrap();
            assert!(result.is_changing_lanes());
        }
        assert_eq!(pipeline.metrics().summary().lane_changes, 1);
    }

    #[test]
    fn test_invalid_frame_is_rejected() {
        let mut pipeline = pipeline(Vec::new());
        let bad = Frame::new(vec![0; 10], WIDTH, HEIGHT, 0.0);
        let err = pipeline.process_frame(&bad, |_| Ok(segments())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DetectorError>(),
            Some(DetectorError::InvalidFrame { .. })
        ));
    }
}
