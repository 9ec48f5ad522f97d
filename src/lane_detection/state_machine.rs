// src/lane_detection/state_machine.rs

use super::types::{DrivingState, TurningDirection};
use crate::error::{DetectorError, DetectorResult};
use crate::rolling_average::RollingAverage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivingStateConfig {
    /// |distance difference| above which a leftward frame counts toward a change
    pub left_change_threshold: f32,
    pub right_change_threshold: f32,
    /// Consecutive consistent frames needed to commit a lane change
    pub confirm_frames: u32,
    /// |distance difference| at or below which a change is considered complete
    pub settle_threshold: f32,
    /// Frames after which a change that never settles is abandoned
    pub max_changing_frames: u32,
}

impl Default for DrivingStateConfig {
    fn default() -> Self {
        Self {
            left_change_threshold: 3.0,
            right_change_threshold: 3.0,
            confirm_frames: 5,
            settle_threshold: 1.0,
            max_changing_frames: 150,
        }
    }
}

impl DrivingStateConfig {
    pub fn validate(&self) -> DetectorResult<()> {
        if self.confirm_frames == 0 {
            return Err(DetectorError::invalid_config(
                "driving_state.confirm_frames must be at least 1",
            ));
        }
        if !(self.left_change_threshold > 0.0 && self.right_change_threshold > 0.0) {
            return Err(DetectorError::invalid_config(
                "driving_state change thresholds must be positive",
            ));
        }
        if !(self.settle_threshold >= 0.0) {
            return Err(DetectorError::invalid_config(
                "driving_state.settle_threshold must be non-negative",
            ));
        }
        if self.max_changing_frames == 0 {
            return Err(DetectorError::invalid_config(
                "driving_state.max_changing_frames must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Candidate-change bookkeeping carried across frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LaneChangeTracker {
    pub frame_count: u32,
    pub first_frame_distance_difference: f32,
    pub previous_distance_difference: f32,
    pub frames_in_change: u32,
}

/// Negative differences mean the vehicle is drifting left
pub fn calculate_changing_lanes_turning_direction(distance_difference: f32) -> TurningDirection {
    if distance_difference < 0.0 {
        TurningDirection::Left
    } else {
        TurningDirection::Right
    }
}

/// NORMAL / CHANGING_LANES_LEFT / CHANGING_LANES_RIGHT with debouncing.
///
/// Distance differences are also fed through a rolling average of
/// `smoothing_window` frames. A frame only counts toward a change when the
/// raw and the smoothed difference both clear the threshold in the same
/// direction, and a change settles on the smoothed difference. The history
/// is cleared whenever the state changes.
#[derive(Debug, Clone)]
pub struct DrivingStateMachine {
    config: DrivingStateConfig,
    state: DrivingState,
    tracker: LaneChangeTracker,
    turning_direction: Option<TurningDirection>,
    smoothed_difference: RollingAverage,
}

impl DrivingStateMachine {
    pub fn new(config: DrivingStateConfig, smoothing_window: usize) -> DetectorResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: DrivingState::Normal,
            tracker: LaneChangeTracker::default(),
            turning_direction: None,
            smoothed_difference: RollingAverage::new(smoothing_window)?,
        })
    }

    pub fn state(&self) -> DrivingState {
        self.state
    }

    pub fn tracker(&self) -> &LaneChangeTracker {
        &self.tracker
    }

    pub fn turning_direction(&self) -> Option<TurningDirection> {
        self.turning_direction
    }

    /// Rolling mean of the differences seen since the last state change
    pub fn smoothed_difference(&self) -> Option<f32> {
        self.smoothed_difference.value().map(|v| v as f32)
    }

    fn smooth(&mut self, difference: f32) -> f32 {
        self.smoothed_difference.push(difference as f64);
        self.smoothed_difference().unwrap_or(difference)
    }

    /// Advance one frame. `None` means no usable measurement this frame;
    /// the tracker is held as-is.
    pub fn update(&mut self, distance_difference: Option<f32>) -> DrivingState {
        match self.state {
            DrivingState::Normal => self.update_normal(distance_difference),
            DrivingState::ChangingLanesLeft | DrivingState::ChangingLanesRight => {
                self.update_changing(distance_difference)
            }
        }
        self.state
    }

    fn update_normal(&mut self, distance_difference: Option<f32>) {
        let Some(difference) = distance_difference else {
            return;
        };
        let smoothed = self.smooth(difference);

        let threshold = if difference < 0.0 {
            self.config.left_change_threshold
        } else {
            self.config.right_change_threshold
        };
        let qualifies = difference.abs() > threshold
            && smoothed.abs() > threshold
            && difference.signum() == smoothed.signum();

        let tracker = &mut self.tracker;
        if qualifies {
            let consistent = tracker.frame_count > 0
                && difference.signum() == tracker.previous_distance_difference.signum();

            if consistent {
                tracker.frame_count += 1;
            } else {
                tracker.frame_count = 1;
                tracker.first_frame_distance_difference = difference;
            }
        } else {
            tracker.frame_count = 0;
            tracker.first_frame_distance_difference = difference;
        }
        tracker.previous_distance_difference = difference;

        debug!(
            "Lane change candidate: difference {:.2} (smoothed {:.2}), {} / {} frames",
            difference, smoothed, tracker.frame_count, self.config.confirm_frames
        );

        if tracker.frame_count >= self.config.confirm_frames {
            self.commit_change();
        }
    }

    fn commit_change(&mut self) {
        let direction =
            calculate_changing_lanes_turning_direction(self.tracker.first_frame_distance_difference);

        self.state = match direction {
            TurningDirection::Left => DrivingState::ChangingLanesLeft,
            TurningDirection::Right => DrivingState::ChangingLanesRight,
        };
        self.turning_direction = Some(direction);
        self.tracker.frames_in_change = 0;
        self.smoothed_difference.clear();

        info!(
            "🚗 Lane change detected: {} (turning {})",
            self.state.as_str(),
            direction.as_str()
        );
    }

    fn update_changing(&mut self, distance_difference: Option<f32>) {
        self.tracker.frames_in_change += 1;

        if self.tracker.frames_in_change > self.config.max_changing_frames {
            warn!(
                "Lane change {} did not settle after {} frames, resetting",
                self.state.as_str(),
                self.config.max_changing_frames
            );
            self.reset();
            return;
        }

        let Some(difference) = distance_difference else {
            return;
        };
        self.tracker.previous_distance_difference = difference;

        if self.smooth(difference).abs() <= self.config.settle_threshold {
            info!(
                "✓ Lane change completed after {} frames",
                self.tracker.frames_in_change
            );
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.state = DrivingState::Normal;
        self.tracker = LaneChangeTracker::default();
        self.turning_direction = None;
        self.smoothed_difference.clear();
    }
}
