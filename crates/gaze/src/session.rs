//! Per-user tracking session
//!
//! Owns the detector and every piece of per-user state: blink counter,
//! smoothing filter, calibration model and the engine that builds it.

use crate::blink::BlinkDetector;
use crate::calibration::{CalibrationEngine, CalibrationProgress, CancelToken};
use crate::config::GazeConfig;
use crate::detector::FaceDetector;
use crate::error::{GazeError, Result};
use crate::mapper::{CalibrationRecord, GazeMapper};
use crate::quality;
use crate::smoothing::EmaSmoother;
use crate::types::{
    now_ms, BlinkUpdate, CalibrationPoint, EyeData, GazeDirection, Point2, TrackedGaze,
};
use crate::vision::LandmarkSource;
use crossbeam_channel::Sender;
use std::time::Duration;
use tokio::sync::watch;

pub struct TrackingSession<D> {
    config: GazeConfig,
    source: LandmarkSource<D>,
    blink: BlinkDetector,
    smoother: EmaSmoother,
    mapper: GazeMapper,
    engine: CalibrationEngine,
    last_gaze: Option<TrackedGaze>,
    output_tx: Option<Sender<TrackedGaze>>,
}

impl<D: FaceDetector> TrackingSession<D> {
    /// Validate the config and initialize the detector
    pub async fn new(config: GazeConfig, detector: D) -> Result<Self> {
        log::info!("Initializing tracking session...");
        config.validate()?;

        let mut source = LandmarkSource::new(detector, &config);
        source.detector_mut().init().await?;

        log::info!(
            "Tracking session ready (layout {}, strategy {})",
            source.extractor().layout().name,
            config.mapper.strategy.as_str()
        );

        Ok(Self {
            blink: BlinkDetector::from_config(&config.blink),
            smoother: EmaSmoother::from_config(&config.smoothing),
            mapper: GazeMapper::from_config(&config),
            engine: CalibrationEngine::new(config.calibration.clone()),
            source,
            last_gaze: None,
            output_tx: None,
            config,
        })
    }

    /// Forward every tracked gaze to a consumer
    pub fn connect_output(&mut self, tx: Sender<TrackedGaze>) {
        log::info!("Connecting tracked gaze output");
        self.output_tx = Some(tx);
    }

    pub fn subscribe_calibration(&self) -> watch::Receiver<CalibrationProgress> {
        self.engine.subscribe()
    }

    /// Run the calibration engine and commit its points on success.
    /// Returns the new quality score. On failure or cancellation the
    /// previous calibration stays in place.
    pub async fn calibrate(&mut self, cancel: &CancelToken) -> Result<f64> {
        let points = self.engine.run(&self.source, cancel).await?;
        self.mapper.set_points(points);
        self.smoother.reset();
        self.last_gaze = None;

        let quality = self.mapper.calibration_quality();
        match quality::residual_rms(&self.mapper) {
            Some(rms) => log::info!(
                "Calibration committed: quality {:.2}, residual {:.4}",
                quality,
                rms
            ),
            None => log::info!("Calibration committed: quality {:.2}", quality),
        }
        Ok(quality)
    }

    /// One tracking tick. A lost face yields the last good gaze with
    /// `face_detected = false`, or `None` before the first detection.
    pub async fn track(&mut self) -> Result<Option<TrackedGaze>> {
        let Some(sample) = self.source.sample().await? else {
            return Ok(self.carry_last_gaze());
        };

        let blink = match &sample.contours {
            Some((left, right)) => self.blink.update_blink(left, right),
            None => BlinkUpdate {
                ear: self.blink.state().ear,
                total_blinks: self.blink.state().total_blinks,
                ..Default::default()
            },
        };

        let raw = sample.eye.gaze;
        let (sx, sy) = self.smoother.smooth(raw.x, raw.y);
        let smoothed = Point2::new(sx, sy);

        let gaze = TrackedGaze {
            raw,
            smoothed,
            direction: GazeDirection::classify(smoothed, self.config.tracking.direction_threshold),
            screen: self.mapper.calibrate_gaze(smoothed),
            blink,
            face_detected: true,
            timestamp_ms: sample.timestamp_ms,
        };
        self.last_gaze = Some(gaze);
        self.forward(gaze);
        Ok(Some(gaze))
    }

    fn carry_last_gaze(&mut self) -> Option<TrackedGaze> {
        let mut gaze = self.last_gaze?;
        gaze.face_detected = false;
        gaze.blink.blink_detected = false;
        gaze.timestamp_ms = now_ms();
        self.forward(gaze);
        Some(gaze)
    }

    fn forward(&mut self, gaze: TrackedGaze) {
        if let Some(tx) = &self.output_tx {
            if tx.send(gaze).is_err() {
                log::warn!("Gaze consumer disconnected");
                self.output_tx = None;
            }
        }
    }

    /// Track every `tick_interval` until cancelled
    pub async fn run(&mut self, cancel: &CancelToken) -> Result<()> {
        let tick = Duration::from_millis(self.config.tracking.tick_interval_ms);
        log::info!("Tracking started ({}ms tick)", tick.as_millis());

        let mut ticks: u64 = 0;
        while !cancel.is_cancelled() {
            match self.track().await {
                Ok(Some(gaze)) if gaze.blink.blink_detected => {
                    log::info!("Blink #{}", gaze.blink.total_blinks)
                }
                Ok(_) => {}
                Err(e) => log::warn!("Tracking tick failed: {}", e),
            }
            ticks += 1;
            tokio::time::sleep(tick).await;
        }

        log::info!("Tracking stopped after {} ticks", ticks);
        Ok(())
    }

    /// Dispose the detector. The session can't track afterwards.
    pub async fn shutdown(&mut self) -> Result<()> {
        log::info!("Shutting down tracking session");
        self.source.detector_mut().dispose().await
    }

    pub fn add_calibration_point(&mut self, screen_x: f64, screen_y: f64, eye: &EyeData) {
        self.mapper.add_calibration_point(screen_x, screen_y, eye);
    }

    /// Take one detector sample and record it against a screen target
    pub async fn capture_calibration_point(
        &mut self,
        screen_x: f64,
        screen_y: f64,
    ) -> Result<CalibrationPoint> {
        let sample = self
            .source
            .sample()
            .await?
            .ok_or(GazeError::NoFaceDetected)?;
        self.mapper
            .add_calibration_point(screen_x, screen_y, &sample.eye);
        Ok(CalibrationPoint {
            screen: Point2::new(screen_x, screen_y),
            raw: sample.eye.gaze,
        })
    }

    pub fn calibrate_gaze(&self, raw: Point2) -> Point2 {
        self.mapper.calibrate_gaze(raw)
    }

    pub fn reset_calibration(&mut self) {
        self.mapper.reset_calibration();
    }

    pub fn calibration_quality(&self) -> f64 {
        self.mapper.calibration_quality()
    }

    pub fn calibration_record(&self) -> CalibrationRecord {
        self.mapper.to_record()
    }

    pub fn load_calibration(&mut self, record: &CalibrationRecord) -> Result<()> {
        self.mapper.load_record(record)
    }

    pub fn last_gaze(&self) -> Option<&TrackedGaze> {
        self.last_gaze.as_ref()
    }

    pub fn blink_state(&self) -> &crate::blink::BlinkState {
        self.blink.state()
    }

    pub fn mapper(&self) -> &GazeMapper {
        &self.mapper
    }

    pub fn detector(&self) -> &D {
        self.source.detector().inner()
    }

    pub fn config(&self) -> &GazeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationState;
    use crate::vision::SimulatedDetector;

    async fn session() -> TrackingSession<SimulatedDetector> {
        TrackingSession::new(
            GazeConfig::default(),
            SimulatedDetector::new().with_blink_period(0).without_jitter(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn uncalibrated_tracking_passes_raw_through() {
        let mut session = session().await;
        session.detector().handle().set_look_at(Point2::new(0.7, 0.4));

        let gaze = session.track().await.unwrap().expect("gaze");
        assert!(gaze.face_detected);
        assert_eq!(gaze.smoothed, gaze.raw);
        assert_eq!(gaze.screen, gaze.raw);
        assert!((gaze.raw.x - 0.2).abs() < 1e-12);
    }

    #[tokio::test]
    async fn lost_face_keeps_last_gaze() {
        let mut session = session().await;
        let handle = session.detector().handle();

        handle.set_face_visible(false);
        assert!(session.track().await.unwrap().is_none());

        handle.set_face_visible(true);
        handle.set_look_at(Point2::new(0.2, 0.8));
        let seen = session.track().await.unwrap().expect("gaze");

        handle.set_face_visible(false);
        let carried = session.track().await.unwrap().expect("last gaze");
        assert!(!carried.face_detected);
        assert_eq!(carried.screen, seen.screen);
        assert_ne!(carried.screen, Point2::ZERO);
    }

    #[tokio::test]
    async fn output_channel_receives_ticks() {
        let mut session = session().await;
        let (tx, rx) = crossbeam_channel::unbounded();
        session.connect_output(tx);

        for _ in 0..3 {
            session.track().await.unwrap();
        }
        assert_eq!(rx.try_iter().count(), 3);

        drop(rx);
        // A gone consumer does not fail tracking
        assert!(session.track().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn direction_follows_smoothed_gaze() {
        let mut session = session().await;
        let handle = session.detector().handle();

        handle.set_look_at(Point2::new(0.5, 0.5));
        let gaze = session.track().await.unwrap().expect("gaze");
        assert_eq!(gaze.direction, GazeDirection::Center);

        // One tick is not enough to pull the smoothed gaze past the threshold
        handle.set_look_at(Point2::new(0.1, 0.5));
        let gaze = session.track().await.unwrap().expect("gaze");
        assert!(gaze.raw.x < -0.3);
        assert_eq!(gaze.direction, GazeDirection::Center);

        let mut last = gaze;
        for _ in 0..10 {
            last = session.track().await.unwrap().expect("gaze");
        }
        assert_eq!(last.direction, GazeDirection::Left);
    }

    #[tokio::test]
    async fn capture_records_point_or_reports_missing_face() {
        let mut session = session().await;
        let handle = session.detector().handle();

        handle.set_look_at(Point2::new(0.8, 0.5));
        let point = session.capture_calibration_point(0.9, 0.5).await.unwrap();
        assert_eq!(point.screen, Point2::new(0.9, 0.5));
        assert!((point.raw.x - 0.3).abs() < 1e-9);
        assert_eq!(session.mapper().points(), &[point]);

        handle.set_face_visible(false);
        let err = session.capture_calibration_point(0.1, 0.5).await.unwrap_err();
        assert!(matches!(err, GazeError::NoFaceDetected));
        assert_eq!(session.mapper().points().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_fourth_target_leaves_session_uncalibrated() {
        let mut session = session().await;
        let progress = session.subscribe_calibration();

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            // Each target takes 1s settle + 4 x 200ms; target 3 samples from 6.4s
            tokio::time::sleep(Duration::from_millis(6500)).await;
            trigger.cancel();
        });

        let err = session.calibrate(&cancel).await.unwrap_err();
        assert!(matches!(err, GazeError::Cancelled));

        let last = *progress.borrow();
        assert_eq!(last.state, CalibrationState::Cancelled);
        assert_eq!(last.target_index, 3);
        assert_eq!(session.mapper().points().len(), 0);
        assert_eq!(session.calibration_quality(), 0.0);
        assert!(!session.mapper().is_calibrated());
    }

    #[tokio::test]
    async fn shutdown_disposes_detector() {
        let mut session = session().await;
        session.shutdown().await.unwrap();
        assert!(session.track().await.is_err());
    }
}
