//! Body landmarks and the three keypoints the posture metric needs.
//!
//! Detectors report the 33-point body topology with coordinates normalised to
//! the frame (0..1 on each axis). Only the nose and both shoulders are used.

use serde::{Deserialize, Serialize};

pub const NOSE: usize = 0;
pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;

/// Number of landmarks in the full body topology.
pub const BODY_LANDMARK_COUNT: usize = 33;

/// One detector landmark. `z` and `visibility` are carried but unused by the metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            visibility: 1.0,
        }
    }
}

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A point in normalised frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
}

impl NormalizedPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn midpoint(self, other: Self) -> Self {
        Self {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }

    /// Scale to pixel space, truncating toward zero like the renderer does.
    pub fn to_pixels(self, size: FrameSize) -> PixelPoint {
        PixelPoint {
            x: (self.x * size.width as f32) as i32,
            y: (self.y * size.height as f32) as i32,
        }
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f32; 2]> for NormalizedPoint {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

/// A point in integer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub fn distance(self, other: Self) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.hypot(dy)
    }
}

/// The keypoints of one detected body, plus the size of the frame they came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkObservation {
    pub nose: NormalizedPoint,
    pub left_shoulder: NormalizedPoint,
    pub right_shoulder: NormalizedPoint,
    pub frame: FrameSize,
}

impl LandmarkObservation {
    pub fn new(
        nose: NormalizedPoint,
        left_shoulder: NormalizedPoint,
        right_shoulder: NormalizedPoint,
        frame: FrameSize,
    ) -> Self {
        Self {
            nose,
            left_shoulder,
            right_shoulder,
            frame,
        }
    }

    /// Pick nose and shoulders out of a full landmark set.
    ///
    /// Returns `None` when the set is too short to contain the shoulders or
    /// any of the three points is not a finite coordinate.
    pub fn from_landmarks(landmarks: &[Landmark], frame: FrameSize) -> Option<Self> {
        let point = |idx: usize| {
            landmarks
                .get(idx)
                .map(|lm| NormalizedPoint::new(lm.x, lm.y))
                .filter(|p| p.is_finite())
        };

        Some(Self {
            nose: point(NOSE)?,
            left_shoulder: point(LEFT_SHOULDER)?,
            right_shoulder: point(RIGHT_SHOULDER)?,
            frame,
        })
    }

    pub fn mid_shoulder(&self) -> NormalizedPoint {
        self.left_shoulder.midpoint(self.right_shoulder)
    }
}
