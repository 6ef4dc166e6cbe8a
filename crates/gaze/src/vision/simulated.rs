//! Synthetic face detector for development and tests
//!
//! Produces MediaPipe-layout frames with both eyes open, an iris that follows
//! a settable screen look-at point, small deterministic jitter and a short
//! blink every `blink_period` frames.

use super::landmarks::mediapipe;
use crate::detector::FaceDetector;
use crate::error::Result;
use crate::types::{now_ms, LandmarkFrame, LandmarkPoint, Point2};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

const LEFT_EYE: Point2 = Point2::new(260.0, 200.0);
const RIGHT_EYE: Point2 = Point2::new(380.0, 200.0);
const EYE_HALF_WIDTH: f64 = 15.0;
/// Lid offsets from the eye midline; open EAR 0.4, closed 0.02
const OPEN_LID_GAP: f64 = 6.0;
const CLOSED_LID_GAP: f64 = 0.3;
/// Iris travel (landmark units) between the screen edges
const IRIS_TRAVEL: f64 = 10.0;
const JITTER: f64 = 0.15;
const BLINK_FRAMES: u64 = 4;

/// Shared controls of a running [`SimulatedDetector`]
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    look_at: Arc<Mutex<Point2>>,
    face_visible: Arc<AtomicBool>,
}

impl SimulatorHandle {
    /// Point on screen (normalized) the simulated user looks at
    pub fn set_look_at(&self, target: Point2) {
        *self.look_at.lock().unwrap_or_else(PoisonError::into_inner) = target;
    }

    pub fn look_at(&self) -> Point2 {
        *self.look_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hide the face to simulate the user leaving the frame
    pub fn set_face_visible(&self, visible: bool) {
        self.face_visible.store(visible, Ordering::Release);
    }
}

pub struct SimulatedDetector {
    handle: SimulatorHandle,
    frame: AtomicU64,
    /// 0 disables blinking
    blink_period: u64,
    jitter: bool,
}

impl SimulatedDetector {
    pub fn new() -> Self {
        Self {
            handle: SimulatorHandle {
                look_at: Arc::new(Mutex::new(Point2::new(0.5, 0.5))),
                face_visible: Arc::new(AtomicBool::new(true)),
            },
            frame: AtomicU64::new(0),
            blink_period: 90,
            jitter: true,
        }
    }

    pub fn with_blink_period(mut self, frames: u64) -> Self {
        self.blink_period = frames;
        self
    }

    /// Noise-free output, for exact assertions
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn handle(&self) -> SimulatorHandle {
        self.handle.clone()
    }

    /// Raw gaze the extractor will report for a look-at point (no jitter)
    pub fn expected_raw(look_at: Point2, gaze_scale: f64) -> Point2 {
        Point2::new(
            (look_at.x - 0.5) * IRIS_TRAVEL / gaze_scale,
            (look_at.y - 0.5) * IRIS_TRAVEL / gaze_scale,
        )
    }

    fn is_blinking(&self, frame: u64) -> bool {
        self.blink_period > 0
            && frame % self.blink_period >= self.blink_period.saturating_sub(BLINK_FRAMES)
    }

    fn synthesize(&self, frame: u64) -> LandmarkFrame {
        let mut points = vec![LandmarkPoint::new(320.0, 240.0); mediapipe::LANDMARK_COUNT];

        let lid_gap = if self.is_blinking(frame) {
            CLOSED_LID_GAP
        } else {
            OPEN_LID_GAP
        };

        let look = self.handle.look_at();
        let (jx, jy) = if self.jitter {
            let t = frame as f64;
            ((t * 0.7).sin() * JITTER, (t * 1.3).cos() * JITTER)
        } else {
            (0.0, 0.0)
        };
        let offset = Point2::new(
            (look.x - 0.5) * IRIS_TRAVEL + jx,
            (look.y - 0.5) * IRIS_TRAVEL + jy,
        );

        for (center, contour, iris) in [
            (LEFT_EYE, &mediapipe::LEFT_EYE_CONTOUR, &mediapipe::LEFT_IRIS),
            (RIGHT_EYE, &mediapipe::RIGHT_EYE_CONTOUR, &mediapipe::RIGHT_IRIS),
        ] {
            let w = EYE_HALF_WIDTH;
            let lid_x = w / 3.0;
            let shape = [
                (-w, 0.0),
                (-lid_x, -lid_gap),
                (lid_x, -lid_gap),
                (w, 0.0),
                (lid_x, lid_gap),
                (-lid_x, lid_gap),
            ];
            for (&i, (dx, dy)) in contour.iter().zip(shape) {
                points[i] = LandmarkPoint::new(center.x + dx, center.y + dy);
            }

            let iris_center = Point2::new(center.x + offset.x, center.y + offset.y);
            let ring = [(0.0, 0.0), (4.0, 0.0), (0.0, -4.0), (-4.0, 0.0), (0.0, 4.0)];
            for (&i, (dx, dy)) in iris.iter().zip(ring) {
                points[i] = LandmarkPoint::new(iris_center.x + dx, iris_center.y + dy);
            }
        }

        LandmarkFrame::new(points, now_ms())
    }
}

impl Default for SimulatedDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FaceDetector for SimulatedDetector {
    async fn init(&mut self) -> Result<()> {
        log::info!("Simulated face detector ready");
        Ok(())
    }

    async fn detect(&self) -> Result<Option<LandmarkFrame>> {
        let frame = self.frame.fetch_add(1, Ordering::AcqRel);
        if !self.handle.face_visible.load(Ordering::Acquire) {
            return Ok(None);
        }
        Ok(Some(self.synthesize(frame)))
    }
}
