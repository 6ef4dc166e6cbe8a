//! Engine configuration, loadable from TOML
//!
//! Every section has working defaults, so an empty file (or no file at all)
//! gives the behaviour the calibration app ships with.

use crate::error::{GazeError, Result};
use crate::mapper::{CalibrationStrategy, MIN_CALIBRATION_POINTS};
use crate::types::{GazeDirection, Point2};
use crate::vision::LandmarkModel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for one tracking session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    pub extractor: ExtractorConfig,
    pub blink: BlinkConfig,
    pub smoothing: SmoothingConfig,
    pub calibration: CalibrationConfig,
    pub mapper: MapperConfig,
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Which landmark index tables the detector output follows
    pub landmark_model: LandmarkModel,
    /// Divisor applied to the iris offset to normalize raw gaze
    pub gaze_scale: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            landmark_model: LandmarkModel::MediaPipeFaceMesh,
            gaze_scale: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    /// Averaged EAR below this counts as a closed-eye frame
    pub ear_threshold: f64,
    /// Closed-eye frames required before reopening counts as a blink
    pub consec_frames: u32,
    /// Per-eye EAR above this counts as open when sampling for calibration
    pub eye_open_threshold: f64,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.3,
            consec_frames: 3,
            eye_open_threshold: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// EMA weight of the newest sample, in (0, 1]
    pub alpha: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { alpha: 0.4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub grid_rows: usize,
    pub grid_cols: usize,
    /// Distance of the outer targets from the screen edge, normalized
    pub grid_margin: f64,
    pub settle_delay_ms: u64,
    pub sample_interval_ms: u64,
    pub samples_per_point: usize,
    /// A target that yields fewer valid samples than this produces no point
    pub min_samples_per_point: usize,
    /// Sampling attempts per target before moving on regardless of yield
    pub max_attempts_per_point: usize,
    /// Wall-clock bound per target, measured from the end of the settle delay
    pub target_timeout_ms: u64,
    /// Bound on a single detector call
    pub detector_timeout_ms: u64,
    /// Points required for the calibration to be usable
    pub min_points: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            grid_rows: 3,
            grid_cols: 3,
            grid_margin: 0.15,
            settle_delay_ms: 1000,
            sample_interval_ms: 200,
            samples_per_point: 5,
            min_samples_per_point: 1,
            max_attempts_per_point: 25,
            target_timeout_ms: 10_000,
            detector_timeout_ms: 1500,
            min_points: MIN_CALIBRATION_POINTS,
        }
    }
}

impl CalibrationConfig {
    pub fn target_count(&self) -> usize {
        self.grid_rows * self.grid_cols
    }

    /// Screen targets in row-major order (top-left first)
    pub fn targets(&self) -> Vec<Point2> {
        let axis = |n: usize, i: usize| {
            if n <= 1 {
                0.5
            } else {
                self.grid_margin + i as f64 * (1.0 - 2.0 * self.grid_margin) / (n - 1) as f64
            }
        };

        (0..self.grid_rows)
            .flat_map(|row| (0..self.grid_cols).map(move |col| (row, col)))
            .map(|(row, col)| Point2::new(axis(self.grid_cols, col), axis(self.grid_rows, row)))
            .collect()
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn target_timeout(&self) -> Duration {
        Duration::from_millis(self.target_timeout_ms)
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_millis(self.detector_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub strategy: CalibrationStrategy,
    /// Added to squared distances in IDW weights
    pub idw_epsilon: f64,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            strategy: CalibrationStrategy::Idw,
            idw_epsilon: 1e-4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Delay between tracking ticks in `TrackingSession::run`
    pub tick_interval_ms: u64,
    /// Smoothed-gaze deflection beyond which `TrackedGaze::direction` leaves center
    pub direction_threshold: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16, // ~60Hz
            direction_threshold: GazeDirection::DEFAULT_THRESHOLD,
        }
    }
}

impl GazeConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: GazeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading gaze config from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, msg: &str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(GazeError::InvalidConfig(msg.to_string()))
            }
        }

        let e = &self.extractor;
        check(
            e.gaze_scale.is_finite() && e.gaze_scale > 0.0,
            "extractor.gaze_scale must be a positive number",
        )?;

        let b = &self.blink;
        check(b.ear_threshold > 0.0, "blink.ear_threshold must be positive")?;
        check(b.consec_frames >= 1, "blink.consec_frames must be at least 1")?;
        check(b.eye_open_threshold > 0.0, "blink.eye_open_threshold must be positive")?;

        let a = self.smoothing.alpha;
        check(a > 0.0 && a <= 1.0, "smoothing.alpha must be in (0, 1]")?;

        let c = &self.calibration;
        check(c.grid_rows >= 1 && c.grid_cols >= 1, "calibration grid must not be empty")?;
        check(
            (0.0..0.5).contains(&c.grid_margin),
            "calibration.grid_margin must be in [0, 0.5)",
        )?;
        check(c.samples_per_point >= 1, "calibration.samples_per_point must be at least 1")?;
        check(
            (1..=c.samples_per_point).contains(&c.min_samples_per_point),
            "calibration.min_samples_per_point must be in 1..=samples_per_point",
        )?;
        check(
            c.max_attempts_per_point >= c.samples_per_point,
            "calibration.max_attempts_per_point must be >= samples_per_point",
        )?;
        check(c.detector_timeout_ms > 0, "calibration.detector_timeout_ms must be positive")?;
        check(
            c.min_points >= MIN_CALIBRATION_POINTS,
            "calibration.min_points must be at least 4",
        )?;
        check(
            c.min_points <= c.target_count(),
            "calibration.min_points exceeds the number of grid targets",
        )?;

        check(
            self.mapper.idw_epsilon > 0.0,
            "mapper.idw_epsilon must be positive",
        )?;

        let t = self.tracking.direction_threshold;
        check(
            t.is_finite() && t > 0.0,
            "tracking.direction_threshold must be a positive number",
        )?;

        Ok(())
    }
}
