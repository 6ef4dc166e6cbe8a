//! Error type shared by the gaze engine

use std::time::Duration;

/// Everything that can go wrong in a tracking session. All variants are
/// recoverable; none of them invalidate the session.
#[derive(Debug, thiserror::Error)]
pub enum GazeError {
    #[error("no face detected in frame")]
    NoFaceDetected,

    #[error("insufficient calibration data: {collected} points collected, {required} required")]
    InsufficientCalibrationData { collected: usize, required: usize },

    #[error("detector failure: {0}")]
    DetectorFailure(String),

    #[error("detector call timed out after {0:?}")]
    DetectorTimeout(Duration),

    #[error("detector call already in flight")]
    DetectorBusy,

    #[error("detector used before init() or after dispose()")]
    DetectorNotInitialized,

    #[error("calibration cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("calibration record error: {0}")]
    Record(#[from] serde_json::Error),

    #[error("unsupported calibration record version {0:?}")]
    UnsupportedRecordVersion(String),
}

pub type Result<T> = std::result::Result<T, GazeError>;
