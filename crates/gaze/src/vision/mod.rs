//! Vision pathway - landmark features and observation sources
//!
//! An [`ObservationSource`] yields one calibration sample candidate per call.
//! [`LandmarkSource`] computes it locally from a [`FaceDetector`];
//! [`MessageSource`] consumes reports of an external face-analysis service.

use crate::blink::eye_open_state;
use crate::config::GazeConfig;
use crate::detector::{DetectorHandle, FaceDetector};
use crate::error::{GazeError, Result};
use crate::types::{EyeContour, EyeData, EyeOpenState, GazeObservation};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

mod analysis;
mod extractor;
pub mod landmarks;
mod simulated;

pub use analysis::{parse_analysis_message, FaceAnalysis};
pub use extractor::EyeFeatureExtractor;
pub use landmarks::{LandmarkLayout, LandmarkModel};
pub use simulated::{SimulatedDetector, SimulatorHandle};

#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Next sample. `Ok(None)` when no face (or no usable position) was seen.
    async fn observe(&self) -> Result<Option<GazeObservation>>;
}

/// Everything one detector frame yields
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkSample {
    pub eye: EyeData,
    /// EAR contours, `None` if any contour landmark was undefined
    pub contours: Option<(EyeContour, EyeContour)>,
    pub eyes: EyeOpenState,
    pub timestamp_ms: u64,
}

impl LandmarkSample {
    pub fn observation(&self) -> GazeObservation {
        GazeObservation {
            raw: self.eye.gaze,
            eyes: self.eyes,
            timestamp_ms: self.timestamp_ms,
        }
    }
}

/// Detector + extractor + per-eye open check
pub struct LandmarkSource<D> {
    detector: DetectorHandle<D>,
    extractor: EyeFeatureExtractor,
    eye_open_threshold: f64,
    blink_threshold: f64,
}

impl<D: FaceDetector> LandmarkSource<D> {
    pub fn new(detector: D, config: &GazeConfig) -> Self {
        Self {
            detector: DetectorHandle::new(detector),
            extractor: EyeFeatureExtractor::from_config(&config.extractor),
            eye_open_threshold: config.blink.eye_open_threshold,
            blink_threshold: config.blink.ear_threshold,
        }
    }

    pub fn detector(&self) -> &DetectorHandle<D> {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut DetectorHandle<D> {
        &mut self.detector
    }

    pub fn extractor(&self) -> &EyeFeatureExtractor {
        &self.extractor
    }

    /// One detector call, reduced to eye features
    pub async fn sample(&self) -> Result<Option<LandmarkSample>> {
        let Some(frame) = self.detector.detect().await? else {
            return Ok(None);
        };
        let Some(eye) = self.extractor.extract_eye_data(&frame) else {
            return Ok(None);
        };

        let contours = self.extractor.eye_contours(&frame);
        // Without a full contour an eye cannot be confirmed open
        let eyes = contours
            .map(|(left, right)| {
                eye_open_state(&left, &right, self.eye_open_threshold, self.blink_threshold)
            })
            .unwrap_or_default();

        Ok(Some(LandmarkSample {
            eye,
            contours,
            eyes,
            timestamp_ms: frame.timestamp_ms,
        }))
    }
}

#[async_trait]
impl<D: FaceDetector> ObservationSource for LandmarkSource<D> {
    async fn observe(&self) -> Result<Option<GazeObservation>> {
        Ok(self.sample().await?.map(|s| s.observation()))
    }
}

/// Observations parsed from face-analysis service messages
pub struct MessageSource {
    rx: Mutex<mpsc::Receiver<String>>,
}

impl MessageSource {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx: Mutex::new(rx) }
    }

    /// Source plus the sender the transport pushes raw messages into
    pub fn channel(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl ObservationSource for MessageSource {
    async fn observe(&self) -> Result<Option<GazeObservation>> {
        let msg = self
            .rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| GazeError::DetectorFailure("analysis channel closed".to_string()))?;

        match parse_analysis_message(&msg) {
            Some(analysis) => Ok(analysis.into_observation()),
            None => {
                log::debug!("Ignoring unparseable analysis message: {msg:?}");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point2;

    #[tokio::test]
    async fn landmark_source_reports_open_eyes() {
        let config = GazeConfig::default();
        let mut source = LandmarkSource::new(SimulatedDetector::new().without_jitter(), &config);
        assert!(matches!(
            source.observe().await,
            Err(GazeError::DetectorNotInitialized)
        ));

        source.detector_mut().init().await.unwrap();
        source.detector().inner().handle().set_look_at(Point2::new(0.15, 0.5));
        let obs = source.observe().await.unwrap().expect("observation");
        assert!(obs.eyes.both_open());
        assert!(!obs.eyes.blinking);
        assert!((obs.raw.x + 0.35).abs() < 1e-12);
    }

    #[tokio::test]
    async fn landmark_source_reports_closed_eyes() {
        let config = GazeConfig::default();
        // blink period 4: every frame is closed
        let mut source =
            LandmarkSource::new(SimulatedDetector::new().with_blink_period(4), &config);
        source.detector_mut().init().await.unwrap();
        let obs = source.observe().await.unwrap().expect("observation");
        assert!(!obs.eyes.left_open && !obs.eyes.right_open);
        assert!(obs.eyes.blinking);
    }

    #[tokio::test]
    async fn message_source_parses_and_closes() {
        let (tx, source) = MessageSource::channel(4);
        tx.send("left=1 right=1 x=0.2 y=0.4".to_string()).await.unwrap();
        tx.send("not a message".to_string()).await.unwrap();
        drop(tx);

        let obs = source.observe().await.unwrap().expect("observation");
        assert_eq!(obs.raw, Point2::new(0.2, 0.4));
        assert!(source.observe().await.unwrap().is_none());
        assert!(matches!(
            source.observe().await,
            Err(GazeError::DetectorFailure(_))
        ));
    }
}
