// src/lane_detection/detector.rs

use super::classifier::{select_candidates, CategoryCandidates, ClassifierThresholds};
use super::position::calculate_lane_position;
use super::state_machine::{DrivingStateConfig, DrivingStateMachine, LaneChangeTracker};
use super::types::{
    DrivingState, LaneDetectionInformation, LaneLine, LaneLineCategory, LaneLineType,
    LineSegment,
};
use crate::error::{DetectorError, DetectorResult};
use crate::object_detection::ObjectBoundingBox;
use crate::rolling_average::RollingAverage;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneDetectorConfig {
    pub rolling_average_window: usize,
    pub horizontal_gradient_threshold: f32,
    pub vertical_gradient_threshold: f32,
    pub middle_band_ratio: f32,
    /// Average representative length (px) at or above which a line is solid
    pub solid_line_length_threshold: f32,
    /// Row used for x-intercepts, as a fraction of frame height
    pub reference_row_ratio: f32,
    pub turning_rounding: i32,
    pub driving_state: DrivingStateConfig,
}

impl Default for LaneDetectorConfig {
    fn default() -> Self {
        Self {
            rolling_average_window: 10,
            horizontal_gradient_threshold: 0.15,
            vertical_gradient_threshold: 5.0,
            middle_band_ratio: 0.1,
            solid_line_length_threshold: 75.0,
            reference_row_ratio: 1.0,
            turning_rounding: 10,
            driving_state: DrivingStateConfig::default(),
        }
    }
}

impl LaneDetectorConfig {
    pub fn validate(&self) -> DetectorResult<()> {
        if self.rolling_average_window == 0 {
            return Err(DetectorError::invalid_config(
                "lane_detector.rolling_average_window must be at least 1",
            ));
        }
        if !(self.horizontal_gradient_threshold >= 0.0
            && self.vertical_gradient_threshold > self.horizontal_gradient_threshold)
        {
            return Err(DetectorError::invalid_config(
                "lane_detector gradient thresholds must satisfy 0 <= horizontal < vertical",
            ));
        }
        if !(0.0..=1.0).contains(&self.middle_band_ratio) {
            return Err(DetectorError::invalid_config(
                "lane_detector.middle_band_ratio must be within [0, 1]",
            ));
        }
        if !(self.reference_row_ratio > 0.0 && self.reference_row_ratio <= 1.0) {
            return Err(DetectorError::invalid_config(
                "lane_detector.reference_row_ratio must be within (0, 1]",
            ));
        }
        if self.turning_rounding < 1 {
            return Err(DetectorError::invalid_config(
                "lane_detector.turning_rounding must be at least 1",
            ));
        }
        self.driving_state.validate()
    }

    fn thresholds(&self) -> ClassifierThresholds {
        ClassifierThresholds {
            horizontal_gradient: self.horizontal_gradient_threshold,
            vertical_gradient: self.vertical_gradient_threshold,
            middle_band_ratio: self.middle_band_ratio,
        }
    }
}

/// Which lines a lateral balance was measured from. Differences are only
/// meaningful between two frames measured the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BalanceBasis {
    Boundaries,
    Middle,
}

#[derive(Debug, Clone, Copy)]
struct LateralBalance {
    basis: BalanceBasis,
    value: f32,
}

#[derive(Debug, Default)]
struct ClassifiedLines {
    left: Option<LaneLine>,
    middle: Option<LaneLine>,
    right: Option<LaneLine>,
}

/// Stateful lane classifier and driving-state tracker. One instance per
/// video stream; frames must be fed in order.
pub struct LaneDetector {
    config: LaneDetectorConfig,
    left_length: RollingAverage,
    middle_length: RollingAverage,
    right_length: RollingAverage,
    lane_width: RollingAverage,
    state_machine: DrivingStateMachine,
    previous_balance: Option<LateralBalance>,
    information: LaneDetectionInformation,
    frame_index: u64,
}

impl LaneDetector {
    pub fn new(config: LaneDetectorConfig) -> DetectorResult<Self> {
        config.validate()?;
        let window = config.rolling_average_window;

        Ok(Self {
            left_length: RollingAverage::new(window)?,
            middle_length: RollingAverage::new(window)?,
            right_length: RollingAverage::new(window)?,
            lane_width: RollingAverage::new(window)?,
            state_machine: DrivingStateMachine::new(config.driving_state.clone(), window)?,
            previous_balance: None,
            information: LaneDetectionInformation::default(),
            frame_index: 0,
            config,
        })
    }

    pub fn config(&self) -> &LaneDetectorConfig {
        &self.config
    }

    /// Snapshot of the most recent frame
    pub fn information(&self) -> &LaneDetectionInformation {
        &self.information
    }

    pub fn driving_state(&self) -> DrivingState {
        self.state_machine.state()
    }

    pub fn tracker(&self) -> &LaneChangeTracker {
        self.state_machine.tracker()
    }

    /// Process one frame's segments. `objects` must come from the same frame.
    pub fn run(
        &mut self,
        segments: &[LineSegment],
        frame_width: usize,
        frame_height: usize,
        objects: &[ObjectBoundingBox],
    ) -> DetectorResult<&LaneDetectionInformation> {
        if frame_width == 0 || frame_height == 0 {
            return Err(DetectorError::InvalidFrame {
                width: frame_width,
                height: frame_height,
            });
        }

        let width = frame_width as f32;
        let reference_y = frame_height as f32 * self.config.reference_row_ratio;

        // 1. Filter + classify
        let candidates = select_candidates(segments, objects, width, &self.config.thresholds());

        // 2. Solid / dashed from rolling lengths
        let lines = self.update_line_types(&candidates);

        // 3. Driving state
        let balance = measure_balance(&lines, width / 2.0, reference_y);
        let distance_difference = match (self.previous_balance, balance) {
            (Some(previous), Some(current)) if previous.basis == current.basis => {
                Some(current.value - previous.value)
            }
            _ => None,
        };
        self.previous_balance = balance;
        let state = self.state_machine.update(distance_difference);

        // 4. Lane width memory, only from stable two-boundary frames
        if state == DrivingState::Normal {
            self.update_lane_width(&lines, reference_y);
        }

        // 5. Remap lines for the current state
        let lines = execute_driving_state(state, lines);

        // 6. Position within the lane
        let position = calculate_lane_position(
            lines.left.as_ref().map(|l| &l.segment),
            lines.right.as_ref().map(|l| &l.segment),
            width,
            reference_y,
            self.lane_width.value().map(|w| w as f32),
            self.config.turning_rounding,
        );

        self.information = LaneDetectionInformation {
            frame_index: self.frame_index,
            left_line: lines.left,
            middle_line: lines.middle,
            right_line: lines.right,
            driving_state: state,
            lane_position_offset: position.map(|p| p.offset),
            turning_direction: self.state_machine.turning_direction(),
            turning_required_percentage: position.map(|p| p.turning_required_percentage),
            lane_overlay_corners: position.and_then(|p| p.overlay_corners),
        };
        self.frame_index += 1;

        debug!(
            "Frame {}: {} lane lines, state {}",
            self.information.frame_index,
            self.information.line_count(),
            state.as_str()
        );

        Ok(&self.information)
    }

    fn update_line_types(&mut self, candidates: &CategoryCandidates) -> ClassifiedLines {
        let threshold = self.config.solid_line_length_threshold;
        let classify = |segment: Option<LineSegment>,
                        category: LaneLineCategory,
                        history: &mut RollingAverage| {
            let segment = segment?;
            history.push(segment.length() as f64);
            let average_length = history.value().unwrap_or(0.0) as f32;
            let line_type = if average_length >= threshold {
                LaneLineType::Solid
            } else {
                LaneLineType::Dashed
            };
            Some(LaneLine {
                segment,
                category,
                line_type,
                average_length,
            })
        };

        ClassifiedLines {
            left: classify(candidates.left, LaneLineCategory::Left, &mut self.left_length),
            middle: classify(
                candidates.middle,
                LaneLineCategory::Middle,
                &mut self.middle_length,
            ),
            right: classify(
                candidates.right,
                LaneLineCategory::Right,
                &mut self.right_length,
            ),
        }
    }

    fn update_lane_width(&mut self, lines: &ClassifiedLines, reference_y: f32) {
        let (Some(left), Some(right)) = (&lines.left, &lines.right) else {
            return;
        };
        let (Some(lx), Some(rx)) = (
            left.segment.x_at_y(reference_y),
            right.segment.x_at_y(reference_y),
        ) else {
            return;
        };

        let width = rx - lx;
        if width > 0.0 && width.is_finite() {
            self.lane_width.push(width as f64);
        }
    }
}

/// Signed lateral imbalance of the vehicle between its markings; grows as
/// the vehicle moves right.
fn measure_balance(
    lines: &ClassifiedLines,
    center_x: f32,
    reference_y: f32,
) -> Option<LateralBalance> {
    let intercept =
        |line: &Option<LaneLine>| line.as_ref().and_then(|l| l.segment.x_at_y(reference_y));

    if let (Some(lx), Some(rx)) = (intercept(&lines.left), intercept(&lines.right)) {
        return Some(LateralBalance {
            basis: BalanceBasis::Boundaries,
            value: (center_x - lx) - (rx - center_x),
        });
    }

    intercept(&lines.middle).map(|mx| LateralBalance {
        basis: BalanceBasis::Middle,
        value: 2.0 * (center_x - mx),
    })
}

/// While changing lanes the boundary being crossed is reported as the middle line
fn execute_driving_state(state: DrivingState, mut lines: ClassifiedLines) -> ClassifiedLines {
    let crossed = match state {
        DrivingState::Normal => return lines,
        DrivingState::ChangingLanesLeft => &mut lines.left,
        DrivingState::ChangingLanesRight => &mut lines.right,
    };

    if lines.middle.is_none() {
        if let Some(mut line) = crossed.take() {
            line.category = LaneLineCategory::Middle;
            lines.middle = Some(line);
        }
    }

    lines
}
