// src/lane_detection/types.rs
use serde::Serialize;

/// Straight edge candidate from the line-extraction stage, in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineSegment {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl LineSegment {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// dy/dx, `None` for a vertical segment
    pub fn slope(&self) -> Option<f32> {
        let dx = self.x2 - self.x1;
        if dx == 0.0 {
            return None;
        }
        Some((self.y2 - self.y1) / dx)
    }

    pub fn length(&self) -> f32 {
        (self.x2 - self.x1).hypot(self.y2 - self.y1)
    }

    pub fn midpoint(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Topmost y (image origin is top-left)
    pub fn min_y(&self) -> f32 {
        self.y1.min(self.y2)
    }

    /// x of the infinite line through this segment at row `y`
    pub fn x_at_y(&self, y: f32) -> Option<f32> {
        let (x0, dxdy) = self.x_of_y()?;
        Some(x0 + dxdy * y)
    }

    /// Line as `x = x0 + dxdy * y`; `None` for a horizontal segment
    pub fn x_of_y(&self) -> Option<(f32, f32)> {
        let dy = self.y2 - self.y1;
        if dy.abs() < f32::EPSILON {
            return None;
        }
        let dxdy = (self.x2 - self.x1) / dy;
        Some((self.x1 - dxdy * self.y1, dxdy))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LaneLineCategory {
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LaneLineType {
    Solid,
    Dashed,
}

/// Representative line of one category for the current frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LaneLine {
    pub segment: LineSegment,
    pub category: LaneLineCategory,
    pub line_type: LaneLineType,
    /// Rolling average length of this category's representatives
    pub average_length: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DrivingState {
    #[default]
    Normal,
    ChangingLanesLeft,
    ChangingLanesRight,
}

impl DrivingState {
    pub fn is_changing(&self) -> bool {
        !matches!(self, Self::Normal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::ChangingLanesLeft => "CHANGING_LANES_LEFT",
            Self::ChangingLanesRight => "CHANGING_LANES_RIGHT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TurningDirection {
    Left,
    Right,
}

impl TurningDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
        }
    }
}

/// Per-frame lane snapshot. `None` fields mean absent / unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LaneDetectionInformation {
    pub frame_index: u64,
    pub left_line: Option<LaneLine>,
    pub middle_line: Option<LaneLine>,
    pub right_line: Option<LaneLine>,
    pub driving_state: DrivingState,
    /// Vehicle centre minus lane centre at the reference row (positive = right of centre)
    pub lane_position_offset: Option<f32>,
    pub turning_direction: Option<TurningDirection>,
    /// Steering needed to re-centre, positive = turn right, in steps of the configured rounding
    pub turning_required_percentage: Option<i32>,
    /// Top-left, top-right, bottom-right, bottom-left of the current lane
    pub lane_overlay_corners: Option<[(f32, f32); 4]>,
}

impl LaneDetectionInformation {
    pub fn line_count(&self) -> usize {
        [self.left_line, self.middle_line, self.right_line]
            .iter()
            .filter(|l| l.is_some())
            .count()
    }
}
