// src/object_detection/types.rs

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectBoundingBox {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in frame pixel coordinates
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

impl ObjectBoundingBox {
    pub fn width(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bbox[3] - self.bbox[1]).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) / 2.0,
            (self.bbox[1] + self.bbox[3]) / 2.0,
        )
    }

    /// Inclusive point containment
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.bbox[0] && x <= self.bbox[2] && y >= self.bbox[1] && y <= self.bbox[3]
    }

    /// Does the segment (x1, y1)-(x2, y2) touch the box anywhere?
    ///
    /// Liang-Barsky clipping against the four edges.
    pub fn intersects_segment(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        if self.contains(x1, y1) || self.contains(x2, y2) {
            return true;
        }

        let dx = x2 - x1;
        let dy = y2 - y1;
        let p = [-dx, dx, -dy, dy];
        let q = [
            x1 - self.bbox[0],
            self.bbox[2] - x1,
            y1 - self.bbox[1],
            self.bbox[3] - y1,
        ];

        let mut t_enter = 0.0f32;
        let mut t_exit = 1.0f32;

        for (pi, qi) in p.iter().zip(q.iter()) {
            if *pi == 0.0 {
                // Parallel to this edge and outside it
                if *qi < 0.0 {
                    return false;
                }
                continue;
            }

            let t = qi / pi;
            if *pi < 0.0 {
                t_enter = t_enter.max(t);
            } else {
                t_exit = t_exit.min(t);
            }

            if t_enter > t_exit {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(bbox: [f32; 4]) -> ObjectBoundingBox {
        ObjectBoundingBox {
            bbox,
            confidence: 0.9,
            class_id: 2,
            class_name: "car".to_string(),
        }
    }

    #[test]
    fn test_segment_with_endpoint_inside_intersects() {
        let b = make_box([100.0, 100.0, 200.0, 200.0]);
        assert!(b.intersects_segment(150.0, 150.0, 400.0, 400.0));
    }

    #[test]
    fn test_segment_crossing_through_box_intersects() {
        let b = make_box([100.0, 100.0, 200.0, 200.0]);
        assert!(b.intersects_segment(50.0, 150.0, 250.0, 150.0));
        assert!(b.intersects_segment(50.0, 50.0, 250.0, 250.0));
    }

    #[test]
    fn test_segment_missing_box_does_not_intersect() {
        let b = make_box([100.0, 100.0, 200.0, 200.0]);
        assert!(!b.intersects_segment(0.0, 0.0, 50.0, 300.0));
        // Bounding region overlaps the box but the segment itself passes by the corner
        assert!(!b.intersects_segment(150.0, 260.0, 260.0, 150.0));
    }

    #[test]
    fn test_geometry_helpers() {
        let b = make_box([10.0, 20.0, 30.0, 60.0]);
        assert_eq!(b.width(), 20.0);
        assert_eq!(b.height(), 40.0);
        assert_eq!(b.area(), 800.0);
        assert_eq!(b.center(), (20.0, 40.0));
    }
}
