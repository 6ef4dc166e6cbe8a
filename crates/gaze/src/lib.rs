//! # VisionCare Gaze - calibration and tracking engine
//!
//! Turns per-frame facial landmarks into a blink state, a smoothed gaze
//! direction and a per-user calibrated screen coordinate. The landmark
//! detector itself is external and plugs in through [`FaceDetector`].
//!
//! Frame flow: landmarks → [`EyeFeatureExtractor`] → [`BlinkDetector`] and
//! [`EmaSmoother`] → [`GazeMapper`], whose points come from a
//! [`CalibrationEngine`] run. [`TrackingSession`] ties them together.

pub mod blink;
pub mod calibration;
pub mod config;
pub mod detector;
pub mod error;
pub mod mapper;
pub mod quality;
pub mod session;
pub mod smoothing;
pub mod types;
pub mod vision;

pub use blink::{BlinkDetector, BlinkState, OpenEdgeBlinkDetector};
pub use calibration::{CalibrationEngine, CalibrationProgress, CalibrationState, CancelToken};
pub use config::GazeConfig;
pub use detector::{DetectorHandle, FaceDetector};
pub use error::{GazeError, Result};
pub use mapper::{CalibrationRecord, CalibrationStrategy, GazeMapper, GazeMapping};
pub use session::TrackingSession;
pub use smoothing::EmaSmoother;
pub use types::*;
pub use vision::{
    EyeFeatureExtractor, LandmarkModel, LandmarkSource, MessageSource, ObservationSource,
    SimulatedDetector,
};
