//! Blink detection from Eye Aspect Ratio (EAR)
//!
//! `EAR = (|p2 - p6| + |p3 - p5|) / (2 * |p1 - p4|)`, averaged over both eyes.
//! A blink is counted when the eyes reopen after at least `consec_frames`
//! consecutive closed frames, which filters out single noisy frames and keeps
//! one close/open cycle from being counted twice.

use crate::config::BlinkConfig;
use crate::types::{BlinkUpdate, EyeContour, EyeOpenState};

/// Below this eye width the EAR is undefined
const MIN_EYE_WIDTH: f64 = 1e-9;

/// EAR of one eye, `None` when the corners coincide
pub fn eye_aspect_ratio(eye: &EyeContour) -> Option<f64> {
    let [p1, p2, p3, p4, p5, p6] = eye.0;

    let horizontal = p1.distance(&p4);
    if horizontal < MIN_EYE_WIDTH {
        return None;
    }

    let vertical1 = p2.distance(&p6);
    let vertical2 = p3.distance(&p5);

    Some((vertical1 + vertical2) / (2.0 * horizontal))
}

/// Average of the defined per-eye EARs
pub fn average_ear(left: &EyeContour, right: &EyeContour) -> Option<f64> {
    match (eye_aspect_ratio(left), eye_aspect_ratio(right)) {
        (Some(l), Some(r)) => Some((l + r) / 2.0),
        (Some(e), None) | (None, Some(e)) => Some(e),
        (None, None) => None,
    }
}

/// Instantaneous per-eye open state, for gating calibration samples
pub fn eye_open_state(
    left: &EyeContour,
    right: &EyeContour,
    open_threshold: f64,
    blink_threshold: f64,
) -> EyeOpenState {
    let is_open = |eye: &EyeContour| eye_aspect_ratio(eye).is_some_and(|ear| ear > open_threshold);
    EyeOpenState {
        left_open: is_open(left),
        right_open: is_open(right),
        blinking: average_ear(left, right).is_some_and(|ear| ear < blink_threshold),
    }
}

/// Mutable state of the debounced detector
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlinkState {
    pub ear: f64,
    pub below_threshold_frames: u32,
    pub total_blinks: u32,
}

/// Debounced EAR blink detector, one per tracking session
#[derive(Debug, Clone)]
pub struct BlinkDetector {
    ear_threshold: f64,
    consec_frames: u32,
    state: BlinkState,
}

impl BlinkDetector {
    pub fn new(ear_threshold: f64, consec_frames: u32) -> Self {
        Self {
            ear_threshold,
            consec_frames: consec_frames.max(1),
            state: BlinkState::default(),
        }
    }

    pub fn from_config(config: &BlinkConfig) -> Self {
        Self::new(config.ear_threshold, config.consec_frames)
    }

    /// Feed one frame's eye contours
    pub fn update_blink(&mut self, left: &EyeContour, right: &EyeContour) -> BlinkUpdate {
        match average_ear(left, right) {
            Some(ear) => self.update_ear(ear),
            None => BlinkUpdate {
                blink_detected: false,
                ear: self.state.ear,
                total_blinks: self.state.total_blinks,
            },
        }
    }

    /// Feed an already averaged EAR
    pub fn update_ear(&mut self, ear: f64) -> BlinkUpdate {
        self.state.ear = ear;
        let mut blink_detected = false;

        if ear < self.ear_threshold {
            self.state.below_threshold_frames += 1;
        } else {
            if self.state.below_threshold_frames >= self.consec_frames {
                self.state.total_blinks += 1;
                blink_detected = true;
                log::debug!(
                    "Blink detected after {} closed frames (total {})",
                    self.state.below_threshold_frames,
                    self.state.total_blinks
                );
            }
            self.state.below_threshold_frames = 0;
        }

        BlinkUpdate {
            blink_detected,
            ear,
            total_blinks: self.state.total_blinks,
        }
    }

    pub fn state(&self) -> &BlinkState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = BlinkState::default();
    }
}

impl Default for BlinkDetector {
    fn default() -> Self {
        Self::from_config(&BlinkConfig::default())
    }
}

/// Degraded fallback for open-state-only inputs: a blink is an open → closed
/// edge, with no frame-count debounce.
#[derive(Debug, Clone, Default)]
pub struct OpenEdgeBlinkDetector {
    was_open: bool,
    total_blinks: u32,
}

impl OpenEdgeBlinkDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, eyes: &EyeOpenState) -> bool {
        let is_open_now = eyes.both_open();
        let blink = self.was_open && !is_open_now;
        if blink {
            self.total_blinks += 1;
        }
        self.was_open = is_open_now;
        blink
    }

    pub fn total_blinks(&self) -> u32 {
        self.total_blinks
    }
}
