// src/pipeline/frame_context.rs
//
// Everything the pipeline concluded about one frame. Objects and lanes
// always come from the same frame.

use crate::lane_detection::LaneDetectionInformation;
use crate::object_detection::ObjectBoundingBox;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct FrameResult {
    pub frame_index: u64,
    pub timestamp_ms: f64,
    pub objects: Vec<ObjectBoundingBox>,
    pub lanes: LaneDetectionInformation,
}

impl FrameResult {
    /// Is the vehicle currently changing lanes?
    pub fn is_changing_lanes(&self) -> bool {
        self.lanes.driving_state.is_changing()
    }

    pub fn has_lanes(&self) -> bool {
        self.lanes.line_count() > 0
    }
}
