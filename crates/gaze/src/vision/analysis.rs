//! Messages from an external face-analysis service
//!
//! Some deployments delegate eye-open detection to a remote service instead
//! of computing EAR locally. This module parses what that service sends back
//! into the engine's own types; transport is the caller's business.

use crate::types::{now_ms, EyeOpenState, GazeDirection, GazeObservation, Point2};
use serde::Deserialize;

/// Parsed face-analysis report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceAnalysis {
    pub face_detected: bool,
    pub eyes: EyeOpenState,
    /// Averaged pupil / gaze position, when the message carried one
    pub raw: Option<Point2>,
    /// Reported by the service, or classified from `raw`
    pub direction: Option<GazeDirection>,
    pub timestamp_ms: u64,
}

impl FaceAnalysis {
    /// Calibration sample candidate; `None` without a face or a position
    pub fn into_observation(self) -> Option<GazeObservation> {
        if !self.face_detected {
            return None;
        }
        Some(GazeObservation {
            raw: self.raw?,
            eyes: self.eyes,
            timestamp_ms: self.timestamp_ms,
        })
    }
}

// {"left_open":true,"right_open":true,"blinking":false,"x":0.1,"y":-0.2}
#[derive(Debug, Deserialize)]
struct FlatMsg {
    left_open: bool,
    right_open: bool,
    #[serde(default)]
    blinking: bool,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(default)]
    timestamp: Option<u64>,
}

// {"success":true,"face_detected":true,"analysis":{"eyes":{...}}}
#[derive(Debug, Deserialize)]
struct ServiceMsg {
    #[serde(default = "default_true")]
    success: bool,
    face_detected: bool,
    #[serde(default)]
    analysis: Option<ServiceAnalysis>,
    #[serde(default)]
    timestamp: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ServiceAnalysis {
    eyes: ServiceEyes,
    #[serde(default)]
    gaze: Option<ServiceGaze>,
}

#[derive(Debug, Deserialize)]
struct ServiceGaze {
    #[serde(default)]
    direction: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceEyes {
    left: ServiceEye,
    right: ServiceEye,
    #[serde(default)]
    both_open: Option<bool>,
    #[serde(default)]
    blinking: bool,
}

#[derive(Debug, Deserialize)]
struct ServiceEye {
    open: bool,
    pupil: Option<JsonPoint>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct JsonPoint {
    x: f64,
    y: f64,
}

fn default_true() -> bool {
    true
}

fn classify(raw: Option<Point2>) -> Option<GazeDirection> {
    raw.map(|p| GazeDirection::classify(p, GazeDirection::DEFAULT_THRESHOLD))
}

pub fn parse_analysis_message(msg: &str) -> Option<FaceAnalysis> {
    let msg = msg.trim();
    if msg.is_empty() {
        return None;
    }

    if msg.starts_with('{') {
        return parse_json(msg);
    }

    // k=v tokens: left=1 right=1 blink=0 x=0.1 y=-0.2 ts=42
    let mut face = true;
    let mut left: Option<bool> = None;
    let mut right: Option<bool> = None;
    let mut blinking = false;
    let mut x: Option<f64> = None;
    let mut y: Option<f64> = None;
    let mut timestamp: Option<u64> = None;

    for tok in msg.split_whitespace() {
        let (k, v) = tok.split_once('=')?;
        match k {
            "face" => face = parse_flag(v)?,
            "left" | "left_open" => left = parse_flag(v),
            "right" | "right_open" => right = parse_flag(v),
            "blink" | "blinking" => blinking = parse_flag(v)?,
            "x" => x = v.parse().ok(),
            "y" => y = v.parse().ok(),
            "ts" | "timestamp" => timestamp = v.parse().ok(),
            _ => {}
        }
    }

    let raw = match (x, y) {
        (Some(x), Some(y)) => Some(Point2::new(x, y)),
        _ => None,
    };

    Some(FaceAnalysis {
        face_detected: face,
        eyes: EyeOpenState {
            left_open: left?,
            right_open: right?,
            blinking,
        },
        raw,
        direction: classify(raw),
        timestamp_ms: timestamp.unwrap_or_else(now_ms),
    })
}

fn parse_json(msg: &str) -> Option<FaceAnalysis> {
    if let Ok(j) = serde_json::from_str::<FlatMsg>(msg) {
        let raw = match (j.x, j.y) {
            (Some(x), Some(y)) => Some(Point2::new(x, y)),
            _ => None,
        };
        return Some(FaceAnalysis {
            face_detected: true,
            eyes: EyeOpenState {
                left_open: j.left_open,
                right_open: j.right_open,
                blinking: j.blinking,
            },
            raw,
            direction: classify(raw),
            timestamp_ms: j.timestamp.unwrap_or_else(now_ms),
        });
    }

    let j = serde_json::from_str::<ServiceMsg>(msg).ok()?;
    let timestamp_ms = j.timestamp.unwrap_or_else(now_ms);
    let analysis = match (j.success && j.face_detected, j.analysis) {
        (true, Some(a)) => a,
        _ => {
            return Some(FaceAnalysis {
                face_detected: false,
                eyes: EyeOpenState::default(),
                raw: None,
                direction: None,
                timestamp_ms,
            })
        }
    };

    let eyes = analysis.eyes;
    // The service's aggregate flag vetoes the per-eye flags
    let both = eyes.both_open.unwrap_or(true);
    let raw = match (eyes.left.pupil, eyes.right.pupil) {
        (Some(l), Some(r)) => Some(Point2::new((l.x + r.x) / 2.0, (l.y + r.y) / 2.0)),
        _ => None,
    };
    let direction = analysis
        .gaze
        .and_then(|g| g.direction)
        .and_then(|d| GazeDirection::parse(&d))
        .or_else(|| classify(raw));

    Some(FaceAnalysis {
        face_detected: true,
        eyes: EyeOpenState {
            left_open: eyes.left.open && both,
            right_open: eyes.right.open && both,
            blinking: eyes.blinking,
        },
        raw,
        direction,
        timestamp_ms,
    })
}

fn parse_flag(v: &str) -> Option<bool> {
    match v {
        "1" | "true" | "t" | "yes" => Some(true),
        "0" | "false" | "nil" | "no" => Some(false),
        _ => None,
    }
}
