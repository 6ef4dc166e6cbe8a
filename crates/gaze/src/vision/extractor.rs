//! Eye feature extraction
//!
//! Turns one landmark frame into per-eye centers, iris positions and a raw
//! gaze vector. Works with any detector whose output matches one of the
//! layouts in [`super::landmarks`].

use super::landmarks::{LandmarkLayout, LandmarkModel};
use crate::config::ExtractorConfig;
use crate::types::{EyeContour, EyeData, EyeSample, EyeSide, GazeVector, LandmarkFrame, Point2};

pub struct EyeFeatureExtractor {
    layout: &'static LandmarkLayout,
    /// Divisor turning an iris offset (landmark units) into a normalized gaze
    gaze_scale: f64,
}

impl EyeFeatureExtractor {
    pub fn new(model: LandmarkModel, gaze_scale: f64) -> Self {
        Self {
            layout: model.layout(),
            gaze_scale,
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(config.landmark_model, config.gaze_scale)
    }

    pub fn layout(&self) -> &'static LandmarkLayout {
        self.layout
    }

    /// Extract both eyes and the combined gaze. `None` means "no detection".
    pub fn extract_eye_data(&self, frame: &LandmarkFrame) -> Option<EyeData> {
        if frame.len() < self.layout.required_len() {
            return None;
        }

        let left = self.eye_sample(frame, EyeSide::Left)?;
        let right = self.eye_sample(frame, EyeSide::Right)?;

        let left_gaze = self.eye_gaze(&left);
        let right_gaze = self.eye_gaze(&right);

        let widths: Vec<f64> = [EyeSide::Left, EyeSide::Right]
            .into_iter()
            .filter_map(|side| self.eye_width(frame, side))
            .collect();
        let pupil_size =
            (!widths.is_empty()).then(|| widths.iter().sum::<f64>() / widths.len() as f64);

        Some(EyeData {
            left,
            right,
            gaze: GazeVector::new(
                (left_gaze.x + right_gaze.x) / 2.0,
                (left_gaze.y + right_gaze.y) / 2.0,
            ),
            pupil_size,
        })
    }

    /// Outer-to-inner corner distance of one eye
    pub fn eye_width(&self, frame: &LandmarkFrame, side: EyeSide) -> Option<f64> {
        let contour = &self.layout.eye(side).contour;
        let outer = frame.point(contour[0])?;
        let inner = frame.point(contour[3])?;
        Some(outer.distance(&inner))
    }

    /// Features of one eye
    pub fn eye_sample(&self, frame: &LandmarkFrame, side: EyeSide) -> Option<EyeSample> {
        let indices = self.layout.eye(side);

        // Only defined contour points contribute to the center
        let contour: Vec<Point2> = indices
            .contour
            .iter()
            .filter_map(|&i| frame.point(i))
            .collect();
        let center = Point2::mean(&contour)?;

        // Without iris landmarks the eye reads as "not deflected"
        let iris = indices
            .iris
            .first()
            .and_then(|&i| frame.point(i))
            .unwrap_or(center);

        Some(EyeSample {
            center,
            pupil: iris,
            iris,
        })
    }

    /// The six EAR landmarks of one eye, `None` if any of them is missing
    pub fn eye_contour(&self, frame: &LandmarkFrame, side: EyeSide) -> Option<EyeContour> {
        let indices = self.layout.eye(side);
        let mut points = [Point2::ZERO; 6];
        for (slot, &i) in points.iter_mut().zip(indices.contour.iter()) {
            *slot = frame.point(i)?;
        }
        Some(EyeContour(points))
    }

    /// Contours of both eyes
    pub fn eye_contours(&self, frame: &LandmarkFrame) -> Option<(EyeContour, EyeContour)> {
        Some((
            self.eye_contour(frame, EyeSide::Left)?,
            self.eye_contour(frame, EyeSide::Right)?,
        ))
    }

    fn eye_gaze(&self, eye: &EyeSample) -> GazeVector {
        GazeVector::new(
            (eye.iris.x - eye.center.x) / self.gaze_scale,
            (eye.iris.y - eye.center.y) / self.gaze_scale,
        )
    }
}

impl Default for EyeFeatureExtractor {
    fn default() -> Self {
        Self::from_config(&ExtractorConfig::default())
    }
}
