// src/pipeline/metrics.rs
//
// Counters and last-frame timings for the perception pipeline.
// Shared handles so the frame loop can report while the pipeline runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub failed_frames: Arc<AtomicU64>,
    pub frames_with_lanes: Arc<AtomicU64>,
    pub frames_with_objects: Arc<AtomicU64>,
    pub lane_changes_detected: Arc<AtomicU64>,
    pub detection_time_us: Arc<AtomicU64>,
    pub extraction_time_us: Arc<AtomicU64>,
    pub lane_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            failed_frames: Arc::new(AtomicU64::new(0)),
            frames_with_lanes: Arc::new(AtomicU64::new(0)),
            frames_with_objects: Arc::new(AtomicU64::new(0)),
            lane_changes_detected: Arc::new(AtomicU64::new(0)),
            detection_time_us: Arc::new(AtomicU64::new(0)),
            extraction_time_us: Arc::new(AtomicU64::new(0)),
            lane_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            failed_frames: self.failed_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            frames_with_lanes: self.frames_with_lanes.load(Ordering::Relaxed),
            frames_with_objects: self.frames_with_objects.load(Ordering::Relaxed),
            lane_changes: self.lane_changes_detected.load(Ordering::Relaxed),
            last_detection_us: self.detection_time_us.load(Ordering::Relaxed),
            last_extraction_us: self.extraction_time_us.load(Ordering::Relaxed),
            last_lane_us: self.lane_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub failed_frames: u64,
    pub fps: f64,
    pub frames_with_lanes: u64,
    pub frames_with_objects: u64,
    pub lane_changes: u64,
    pub last_detection_us: u64,
    pub last_extraction_us: u64,
    pub last_lane_us: u64,
    pub elapsed_secs: f64,
}
