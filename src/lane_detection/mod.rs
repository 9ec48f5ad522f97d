// src/lane_detection/mod.rs
//
// Line segments + object boxes → filtered, classified lane lines →
// driving state (normal / changing left / changing right) → lane position.

mod classifier;
mod detector;
mod position;
mod state_machine;
mod types;

pub use classifier::{
    classify_segment, is_line_within_object_bounding_boxes, select_candidates,
    CategoryCandidates, ClassifierThresholds,
};
pub use detector::{LaneDetector, LaneDetectorConfig};
pub use position::{calculate_lane_position, turning_required, LanePosition};
pub use state_machine::{
    calculate_changing_lanes_turning_direction, DrivingStateConfig, DrivingStateMachine,
    LaneChangeTracker,
};
pub use types::{
    DrivingState, LaneDetectionInformation, LaneLine, LaneLineCategory, LaneLineType,
    LineSegment, TurningDirection,
};
