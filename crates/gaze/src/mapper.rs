//! Raw gaze → screen mapping
//!
//! A [`GazeMapper`] holds the per-user calibration points and one
//! [`GazeMapping`] strategy chosen at construction. With fewer than
//! [`MIN_CALIBRATION_POINTS`] points every strategy passes raw input through.

use crate::config::{CalibrationConfig, GazeConfig, MapperConfig};
use crate::error::{GazeError, Result};
use crate::quality;
use crate::types::{now_ms, CalibrationPoint, EyeData, Point2};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Points needed before any strategy stops passing raw input through
pub const MIN_CALIBRATION_POINTS: usize = 4;

/// Raw ranges at or below this are treated as degenerate
const MIN_RAW_RANGE: f64 = 1e-9;

pub const RECORD_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationStrategy {
    /// Per-axis bias and scale. Legacy fallback.
    Affine,
    /// Inverse-distance-weighted interpolation
    #[default]
    Idw,
}

impl CalibrationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Affine => "affine",
            Self::Idw => "idw",
        }
    }

    pub fn mapping(&self, idw_epsilon: f64) -> Box<dyn GazeMapping> {
        match self {
            Self::Affine => Box::new(AffineMapping),
            Self::Idw => Box::new(IdwMapping::new(idw_epsilon)),
        }
    }
}

/// One raw → screen mapping strategy
pub trait GazeMapping: Send + Sync {
    fn map(&self, points: &[CalibrationPoint], raw: Point2) -> Point2;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AffineMapping;

impl GazeMapping for AffineMapping {
    fn map(&self, points: &[CalibrationPoint], raw: Point2) -> Point2 {
        if points.len() < MIN_CALIBRATION_POINTS {
            return raw;
        }

        let n = points.len() as f64;
        let (dx, dy) = points.iter().fold((0.0, 0.0), |(dx, dy), p| {
            (dx + (p.screen.x - p.raw.x), dy + (p.screen.y - p.raw.y))
        });
        let offset = Point2::new(dx / n, dy / n);

        let scale_x = axis_scale(points.iter().map(|p| (p.screen.x, p.raw.x)));
        let scale_y = axis_scale(points.iter().map(|p| (p.screen.y, p.raw.y)));

        Point2::new(raw.x * scale_x + offset.x, raw.y * scale_y + offset.y)
    }
}

/// `range(screen) / range(raw)`, or 1 when the raw range is degenerate
fn axis_scale(pairs: impl Iterator<Item = (f64, f64)>) -> f64 {
    let (mut s_min, mut s_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut r_min, mut r_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for (s, r) in pairs {
        s_min = s_min.min(s);
        s_max = s_max.max(s);
        r_min = r_min.min(r);
        r_max = r_max.max(r);
    }

    let raw_range = r_max - r_min;
    if !raw_range.is_finite() || raw_range <= MIN_RAW_RANGE {
        return 1.0;
    }
    (s_max - s_min) / raw_range
}

#[derive(Debug, Clone, Copy)]
pub struct IdwMapping {
    epsilon: f64,
}

impl IdwMapping {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }
}

impl Default for IdwMapping {
    fn default() -> Self {
        Self::new(MapperConfig::default().idw_epsilon)
    }
}

impl GazeMapping for IdwMapping {
    fn map(&self, points: &[CalibrationPoint], raw: Point2) -> Point2 {
        if points.len() < MIN_CALIBRATION_POINTS {
            return raw;
        }

        let mut total_weight = 0.0;
        let mut x = 0.0;
        let mut y = 0.0;
        for p in points {
            let w = 1.0 / (raw.distance_squared(&p.raw) + self.epsilon);
            total_weight += w;
            x += w * p.screen.x;
            y += w * p.screen.y;
        }

        if !total_weight.is_finite() || total_weight <= 0.0 {
            return raw;
        }
        Point2::new(x / total_weight, y / total_weight)
    }
}

/// Ordered calibration points of one user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationModel {
    points: Vec<CalibrationPoint>,
}

impl CalibrationModel {
    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_calibrated(&self) -> bool {
        self.points.len() >= MIN_CALIBRATION_POINTS
    }

    fn push(&mut self, point: CalibrationPoint) {
        self.points.push(point);
    }

    fn clear(&mut self) {
        self.points.clear();
    }
}

pub struct GazeMapper {
    strategy: CalibrationStrategy,
    mapping: Box<dyn GazeMapping>,
    model: CalibrationModel,
    target_count: usize,
}

impl GazeMapper {
    pub fn new(strategy: CalibrationStrategy, idw_epsilon: f64) -> Self {
        Self {
            strategy,
            mapping: strategy.mapping(idw_epsilon),
            model: CalibrationModel::default(),
            target_count: CalibrationConfig::default().target_count(),
        }
    }

    pub fn from_config(config: &GazeConfig) -> Self {
        Self::new(config.mapper.strategy, config.mapper.idw_epsilon)
            .with_target_count(config.calibration.target_count())
    }

    /// Denominator of [`GazeMapper::calibration_quality`]
    pub fn with_target_count(mut self, target_count: usize) -> Self {
        self.target_count = target_count;
        self
    }

    pub fn strategy(&self) -> CalibrationStrategy {
        self.strategy
    }

    /// Record the combined gaze of `eye` against a screen target
    pub fn add_calibration_point(&mut self, screen_x: f64, screen_y: f64, eye: &EyeData) {
        self.add_point(CalibrationPoint {
            screen: Point2::new(screen_x, screen_y),
            raw: eye.gaze,
        });
    }

    pub fn add_point(&mut self, point: CalibrationPoint) {
        if !point.screen.is_finite() || !point.raw.is_finite() {
            log::warn!("Ignoring non-finite calibration point {:?}", point);
            return;
        }
        self.model.push(point);
        log::debug!(
            "Calibration point {} added: screen=({:.3}, {:.3}) raw=({:.4}, {:.4})",
            self.model.len(),
            point.screen.x,
            point.screen.y,
            point.raw.x,
            point.raw.y
        );
    }

    /// Replace the whole model, e.g. with the result of a calibration run
    pub fn set_points(&mut self, points: impl IntoIterator<Item = CalibrationPoint>) {
        self.model.clear();
        for point in points {
            self.add_point(point);
        }
    }

    pub fn calibrate_gaze(&self, raw: Point2) -> Point2 {
        self.mapping.map(self.model.points(), raw)
    }

    pub fn reset_calibration(&mut self) {
        log::info!("Calibration reset ({} points discarded)", self.model.len());
        self.model.clear();
    }

    pub fn calibration_quality(&self) -> f64 {
        quality::calibration_quality(self.model.len(), self.target_count)
    }

    pub fn is_calibrated(&self) -> bool {
        self.model.is_calibrated()
    }

    pub fn model(&self) -> &CalibrationModel {
        &self.model
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        self.model.points()
    }

    pub fn to_record(&self) -> CalibrationRecord {
        CalibrationRecord {
            version: RECORD_VERSION.to_string(),
            timestamp: now_ms() as i64,
            points: self
                .model
                .points()
                .iter()
                .map(|p| RecordPoint {
                    screen_x: p.screen.x,
                    screen_y: p.screen.y,
                    pupil_x: p.raw.x,
                    pupil_y: p.raw.y,
                })
                .collect(),
        }
    }

    /// Replace the model with a persisted record. On error the model is untouched.
    pub fn load_record(&mut self, record: &CalibrationRecord) -> Result<()> {
        if record.version != RECORD_VERSION {
            return Err(GazeError::UnsupportedRecordVersion(record.version.clone()));
        }
        self.set_points(record.points.iter().map(|p| CalibrationPoint {
            screen: Point2::new(p.screen_x, p.screen_y),
            raw: Point2::new(p.pupil_x, p.pupil_y),
        }));
        log::info!(
            "Loaded calibration record from {} ({} points)",
            record.timestamp,
            self.model.len()
        );
        Ok(())
    }
}

impl Default for GazeMapper {
    fn default() -> Self {
        Self::from_config(&GazeConfig::default())
    }
}

/// Persisted calibration, shared with the web and mobile clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub version: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub points: Vec<RecordPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPoint {
    pub screen_x: f64,
    pub screen_y: f64,
    pub pupil_x: f64,
    pub pupil_y: f64,
}

impl CalibrationRecord {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EyeSample;

    fn corner_points() -> Vec<CalibrationPoint> {
        [
            ((0.0, 0.0), (-1.0, -1.0)),
            ((1.0, 0.0), (1.0, -1.0)),
            ((0.0, 1.0), (-1.0, 1.0)),
            ((1.0, 1.0), (1.0, 1.0)),
        ]
        .into_iter()
        .map(|((sx, sy), (rx, ry))| CalibrationPoint {
            screen: Point2::new(sx, sy),
            raw: Point2::new(rx, ry),
        })
        .collect()
    }

    fn mapper(strategy: CalibrationStrategy) -> GazeMapper {
        let mut m = GazeMapper::new(strategy, 1e-4);
        m.set_points(corner_points());
        m
    }

    #[test]
    fn identity_before_calibration() {
        for strategy in [CalibrationStrategy::Affine, CalibrationStrategy::Idw] {
            let mut m = GazeMapper::new(strategy, 1e-4);
            for raw in [Point2::new(0.3, -0.7), Point2::ZERO, Point2::new(-5.0, 9.0)] {
                assert_eq!(m.calibrate_gaze(raw), raw);
            }
            // Three points are still not enough
            for p in corner_points().into_iter().take(3) {
                m.add_point(p);
            }
            assert!(!m.is_calibrated());
            assert_eq!(m.calibrate_gaze(Point2::new(0.3, 0.3)), Point2::new(0.3, 0.3));
        }
    }

    #[test]
    fn affine_maps_center_between_corners() {
        let m = mapper(CalibrationStrategy::Affine);
        let out = m.calibrate_gaze(Point2::ZERO);
        assert!((out.x - 0.5).abs() < 1e-12);
        assert!((out.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn affine_degenerate_raw_range_keeps_unit_scale() {
        let mut m = GazeMapper::new(CalibrationStrategy::Affine, 1e-4);
        for (sx, sy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
            m.add_point(CalibrationPoint {
                screen: Point2::new(sx, sy),
                raw: Point2::new(0.2, 0.2),
            });
        }
        // offset = 0.5 - 0.2 per axis, scale 1
        let out = m.calibrate_gaze(Point2::new(0.2, 0.4));
        assert!((out.x - 0.5).abs() < 1e-12);
        assert!((out.y - 0.7).abs() < 1e-12);
    }

    #[test]
    fn idw_exact_match_returns_stored_screen() {
        let m = mapper(CalibrationStrategy::Idw);
        let out = m.calibrate_gaze(Point2::new(-1.0, -1.0));
        assert!(out.x.abs() < 1e-3 && out.y.abs() < 1e-3);

        let far = m.calibrate_gaze(Point2::new(1.0, 1.0));
        assert!((far.x - 1.0).abs() < 1e-3 && (far.y - 1.0).abs() < 1e-3);

        let center = m.calibrate_gaze(Point2::ZERO);
        assert!((center.x - 0.5).abs() < 1e-12 && (center.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn add_calibration_point_uses_combined_gaze() {
        let mut m = GazeMapper::default();
        let eye = EyeSample {
            center: Point2::ZERO,
            pupil: Point2::ZERO,
            iris: Point2::ZERO,
        };
        m.add_calibration_point(
            0.15,
            0.85,
            &EyeData {
                left: eye,
                right: eye,
                gaze: Point2::new(-0.3, 0.4),
                pupil_size: None,
            },
        );
        assert_eq!(m.points()[0].raw, Point2::new(-0.3, 0.4));
        assert_eq!(m.points()[0].screen, Point2::new(0.15, 0.85));

        m.add_point(CalibrationPoint {
            screen: Point2::new(f64::NAN, 0.0),
            raw: Point2::ZERO,
        });
        assert_eq!(m.points().len(), 1);
    }

    #[test]
    fn quality_tracks_points_and_reset() {
        let mut m = GazeMapper::default();
        assert_eq!(m.calibration_quality(), 0.0);
        let mut last = 0.0;
        for (i, p) in corner_points().into_iter().cycle().take(12).enumerate() {
            m.add_point(p);
            let q = m.calibration_quality();
            assert!(q >= last && q <= 1.0);
            assert!((q - ((i + 1) as f64 / 9.0).min(1.0)).abs() < 1e-12);
            last = q;
        }
        m.reset_calibration();
        assert_eq!(m.calibration_quality(), 0.0);
        assert!(!m.is_calibrated());
    }

    #[test]
    fn record_round_trip() {
        let m = mapper(CalibrationStrategy::Idw);
        let json = m.to_record().to_json().unwrap();
        assert!(json.contains("\"screenX\""));
        assert!(json.contains("\"pupilY\""));
        assert!(json.contains("\"version\": \"1.0\""));

        let record = CalibrationRecord::from_json(&json).unwrap();
        let mut restored = GazeMapper::new(CalibrationStrategy::Idw, 1e-4);
        restored.load_record(&record).unwrap();
        assert_eq!(restored.points(), m.points());
    }

    #[test]
    fn rejects_unknown_record_version() {
        let mut m = mapper(CalibrationStrategy::Affine);
        let mut record = m.to_record();
        record.version = "2.0".to_string();
        record.points.clear();
        let err = m.load_record(&record).unwrap_err();
        assert!(matches!(err, GazeError::UnsupportedRecordVersion(v) if v == "2.0"));
        assert_eq!(m.points().len(), 4);
    }

    #[test]
    fn strategy_parses_lowercase() {
        let s: CalibrationStrategy = serde_json::from_str("\"affine\"").unwrap();
        assert_eq!(s, CalibrationStrategy::Affine);
        assert_eq!(CalibrationStrategy::default(), CalibrationStrategy::Idw);
        assert_eq!(CalibrationStrategy::Idw.as_str(), "idw");
    }
}
