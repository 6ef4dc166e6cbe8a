use async_trait::async_trait;
use std::time::Duration;
use visioncare_gaze::calibration::CalibrationState;
use visioncare_gaze::config::CalibrationConfig;
use visioncare_gaze::{
    CalibrationEngine, CalibrationRecord, CancelToken, FaceDetector, GazeConfig, GazeError,
    LandmarkFrame, MessageSource, Point2, Result, SimulatedDetector, TrackingSession,
};

/// Moves the simulated user's gaze to each target as the engine announces it
fn follow_targets(session: &TrackingSession<SimulatedDetector>) -> tokio::task::JoinHandle<()> {
    let mut progress = session.subscribe_calibration();
    let look = session.detector().handle();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let p = *progress.borrow_and_update();
            if let Some(target) = p.target {
                look.set_look_at(target);
            }
            if p.state.is_terminal() {
                break;
            }
        }
    })
}

#[tokio::test(start_paused = true)]
async fn simulated_calibration_then_tracking() {
    let mut session = TrackingSession::new(GazeConfig::default(), SimulatedDetector::new())
        .await
        .unwrap();
    let follower = follow_targets(&session);

    let quality = session.calibrate(&CancelToken::new()).await.unwrap();
    follower.await.unwrap();
    assert_eq!(quality, 1.0);
    assert_eq!(session.mapper().points().len(), 9);

    let look = session.detector().handle();
    for target in [Point2::new(0.85, 0.15), Point2::new(0.5, 0.5), Point2::new(0.15, 0.85)] {
        look.set_look_at(target);
        let mut last = None;
        for _ in 0..20 {
            last = session.track().await.unwrap();
        }
        let gaze = last.expect("gaze");
        assert!(gaze.face_detected);
        assert!(
            gaze.screen.distance(&target) < 0.08,
            "target {:?} mapped to {:?}",
            target,
            gaze.screen
        );
    }
}

struct HangingDetector;

#[async_trait]
impl FaceDetector for HangingDetector {
    async fn detect(&self) -> Result<Option<LandmarkFrame>> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(Some(LandmarkFrame::default()))
    }
}

#[tokio::test(start_paused = true)]
async fn hanging_detector_is_abandoned_per_target() {
    let mut session = TrackingSession::new(GazeConfig::default(), HangingDetector)
        .await
        .unwrap();

    let start = tokio::time::Instant::now();
    let err = session.calibrate(&CancelToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        GazeError::InsufficientCalibrationData {
            collected: 0,
            required: 4
        }
    ));
    assert_eq!(session.calibration_quality(), 0.0);

    // Every target stops at its 10s deadline, after the 1s settle delay
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(9 * 11), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(9 * 12), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn cancelled_calibration_keeps_previous_model() {
    let mut session = TrackingSession::new(GazeConfig::default(), SimulatedDetector::new())
        .await
        .unwrap();

    let mut previous = session.calibration_record();
    previous.points = (0..4)
        .map(|i| visioncare_gaze::mapper::RecordPoint {
            screen_x: (i % 2) as f64,
            screen_y: (i / 2) as f64,
            pupil_x: (i % 2) as f64 - 0.5,
            pupil_y: (i / 2) as f64 - 0.5,
        })
        .collect();
    session.load_calibration(&previous).unwrap();

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(7500)).await;
        trigger.cancel();
    });

    let err = session.calibrate(&cancel).await.unwrap_err();
    assert!(matches!(err, GazeError::Cancelled));
    assert_eq!(session.subscribe_calibration().borrow().state, CalibrationState::Cancelled);
    assert_eq!(session.mapper().points().len(), 4);
    assert_eq!(session.calibrate_gaze(Point2::ZERO), Point2::new(0.5, 0.5));
}

#[tokio::test(start_paused = true)]
async fn record_survives_a_file_round_trip() {
    let mut session = TrackingSession::new(GazeConfig::default(), SimulatedDetector::new())
        .await
        .unwrap();
    let follower = follow_targets(&session);
    session.calibrate(&CancelToken::new()).await.unwrap();
    follower.await.unwrap();

    let path = std::env::temp_dir().join(format!("visioncare-gaze-{}.json", std::process::id()));
    session.calibration_record().save(&path).unwrap();
    let record = CalibrationRecord::load(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(record.version, "1.0");
    assert_eq!(record.points.len(), 9);

    let mut restored = TrackingSession::new(GazeConfig::default(), SimulatedDetector::new())
        .await
        .unwrap();
    restored.load_calibration(&record).unwrap();
    let probe = Point2::new(0.12, -0.07);
    let a = session.calibrate_gaze(probe);
    let b = restored.calibrate_gaze(probe);
    assert!(a.distance(&b) < 1e-12);
}

#[tokio::test(start_paused = true)]
async fn calibrates_from_analysis_messages() {
    let config = CalibrationConfig::default();
    let targets = config.targets();
    let (tx, source) = MessageSource::channel(64);

    for target in &targets {
        // One blink report per target, then five open-eye samples
        tx.send("left=0 right=0 blink=1 x=0 y=0".to_string()).await.unwrap();
        for _ in 0..5 {
            tx.send(format!("left=1 right=1 x={} y={}", target.x - 0.5, target.y - 0.5))
                .await
                .unwrap();
        }
    }

    let mut engine = CalibrationEngine::new(config);
    let points = engine.run(&source, &CancelToken::new()).await.unwrap();
    assert_eq!(engine.state(), CalibrationState::Done);
    assert_eq!(points.len(), 9);
    for (point, target) in points.iter().zip(&targets) {
        assert_eq!(point.screen, *target);
        assert!((point.raw.x - (target.x - 0.5)).abs() < 1e-12);
    }
}
