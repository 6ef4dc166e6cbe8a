//! Core data types for the gaze engine

use serde::{Deserialize, Serialize};

/// A 2D coordinate (landmark space, raw gaze space or screen space)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const ZERO: Point2 = Point2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2) -> f64 {
        self.distance_squared(other).sqrt()
    }

    pub fn distance_squared(&self, other: &Point2) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Arithmetic mean of a set of points, `None` for an empty set
    pub fn mean(points: &[Point2]) -> Option<Point2> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point2::new(sx / n, sy / n))
    }
}

/// Normalized gaze direction, roughly in [-1, 1] on both axes
pub type GazeVector = Point2;

/// One labeled landmark from the external face detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: Option<f64>,
    #[serde(default)]
    pub label: Option<String>,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            label: None,
        }
    }

    /// The 2D part of the landmark, if both coordinates are defined
    pub fn xy(&self) -> Option<Point2> {
        let p = Point2::new(self.x, self.y);
        p.is_finite().then_some(p)
    }
}

/// All landmarks the detector produced for a single video frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub points: Vec<LandmarkPoint>,
    /// Capture time in milliseconds
    pub timestamp_ms: u64,
}

impl LandmarkFrame {
    pub fn new(points: Vec<LandmarkPoint>, timestamp_ms: u64) -> Self {
        Self {
            points,
            timestamp_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Defined 2D coordinate of landmark `index`
    pub fn point(&self, index: usize) -> Option<Point2> {
        self.points.get(index).and_then(LandmarkPoint::xy)
    }
}

/// Which eye a landmark set or sample belongs to (subject's left/right)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EyeSide {
    Left,
    Right,
}

/// Per-eye features derived from one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeSample {
    pub center: Point2,
    pub pupil: Point2,
    pub iris: Point2,
}

/// Both eyes plus the combined raw gaze
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeData {
    pub left: EyeSample,
    pub right: EyeSample,
    pub gaze: GazeVector,
    /// Pupil size estimate: mean corner-to-corner eye width, in landmark units
    pub pupil_size: Option<f64>,
}

/// Coarse gaze direction, as reported by the face-analysis service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GazeDirection {
    #[default]
    Center,
    Left,
    Right,
    Up,
    Down,
}

impl GazeDirection {
    /// Axis deflection beyond which a gaze leaves `Center`
    pub const DEFAULT_THRESHOLD: f64 = 0.3;

    /// Horizontal deflection wins over vertical; +y points down
    pub fn classify(gaze: GazeVector, threshold: f64) -> Self {
        if gaze.x.abs() > threshold {
            if gaze.x > 0.0 {
                Self::Right
            } else {
                Self::Left
            }
        } else if gaze.y.abs() > threshold {
            if gaze.y > 0.0 {
                Self::Down
            } else {
                Self::Up
            }
        } else {
            Self::Center
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "center" => Some(Self::Center),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// The six EAR landmarks of one eye, in order:
/// outer corner, two upper-lid points, inner corner, two lower-lid points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeContour(pub [Point2; 6]);

/// Per-eye open state, either computed locally or reported by an external
/// face-analysis service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EyeOpenState {
    pub left_open: bool,
    pub right_open: bool,
    #[serde(default)]
    pub blinking: bool,
}

impl EyeOpenState {
    pub const OPEN: EyeOpenState = EyeOpenState {
        left_open: true,
        right_open: true,
        blinking: false,
    };

    pub fn both_open(&self) -> bool {
        self.left_open && self.right_open
    }
}

/// One candidate calibration sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeObservation {
    /// Raw gaze (or averaged pupil) coordinate
    pub raw: Point2,
    pub eyes: EyeOpenState,
    pub timestamp_ms: u64,
}

/// A screen target paired with the raw gaze recorded while fixating it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// Target position, normalized [0, 1]
    pub screen: Point2,
    /// Averaged raw gaze sample
    pub raw: Point2,
}

/// Result of one blink detector update
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlinkUpdate {
    pub blink_detected: bool,
    pub ear: f64,
    pub total_blinks: u32,
}

/// Output of one tracking tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedGaze {
    pub raw: GazeVector,
    pub smoothed: GazeVector,
    /// Direction of the smoothed gaze
    pub direction: GazeDirection,
    /// Calibrated screen coordinate (raw passthrough when uncalibrated)
    pub screen: Point2,
    pub blink: BlinkUpdate,
    /// False when this value is the last good gaze carried over a lost frame
    pub face_detected: bool,
    pub timestamp_ms: u64,
}

pub(crate) fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
