//! Calibration quality estimates

use crate::mapper::GazeMapper;

/// Completeness score: `min(1, collected / target_count)`, 0 without targets
pub fn calibration_quality(collected: usize, target_count: usize) -> f64 {
    if target_count == 0 {
        return 0.0;
    }
    (collected as f64 / target_count as f64).min(1.0)
}

/// RMS distance between each stored screen target and the mapping of its own
/// raw sample. `None` while the mapper is uncalibrated.
pub fn residual_rms(mapper: &GazeMapper) -> Option<f64> {
    if !mapper.is_calibrated() {
        return None;
    }
    let points = mapper.points();
    let sum: f64 = points
        .iter()
        .map(|p| mapper.calibrate_gaze(p.raw).distance_squared(&p.screen))
        .sum();
    Some((sum / points.len() as f64).sqrt())
}
