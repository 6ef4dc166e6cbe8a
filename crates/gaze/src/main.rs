//! VisionCare Gaze
//!
//! Development runner for the gaze engine. This application:
//! - Runs a full 9-point calibration against the simulated detector
//! - Prints (and optionally saves) the resulting calibration record
//! - Tracks gaze until Ctrl+C, logging blinks and calibrated positions

use anyhow::Result;
use log::LevelFilter;
use std::env;
use visioncare_gaze::{
    CalibrationRecord, CancelToken, GazeConfig, Point2, SimulatedDetector, TrackingSession,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .init();

    log::info!("═══════════════════════════════════════");
    log::info!("  VisionCare Gaze - calibration + tracking");
    log::info!("═══════════════════════════════════════");

    let config = match env::var("VISIONCARE_GAZE_CONFIG") {
        Ok(path) => GazeConfig::load(path)?,
        Err(_) => {
            log::info!("VISIONCARE_GAZE_CONFIG not set, using defaults");
            GazeConfig::default()
        }
    };

    let detector = SimulatedDetector::new();
    let look = detector.handle();
    let mut session = TrackingSession::new(config, detector).await?;

    // Set up Ctrl+C handler
    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal...");
        on_signal.cancel();
    })?;

    // Point the simulated user at each target as the engine announces it
    let mut progress = session.subscribe_calibration();
    let follower = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let p = *progress.borrow_and_update();
            if let Some(target) = p.target {
                look.set_look_at(target);
            }
            if p.state.is_terminal() {
                break;
            }
        }
        look
    });

    let loaded = match env::var("VISIONCARE_CALIBRATION_IN") {
        Ok(path) => {
            let record = CalibrationRecord::load(&path)?;
            session.load_calibration(&record)?;
            true
        }
        Err(_) => false,
    };

    if !loaded {
        match session.calibrate(&cancel).await {
            Ok(quality) => log::info!("Calibration quality: {:.0}%", quality * 100.0),
            Err(e) => {
                log::error!("Calibration did not complete: {}", e);
                session.shutdown().await?;
                return Ok(());
            }
        }
    } else {
        follower.abort();
    }

    let record = session.calibration_record();
    println!("{}", record.to_json()?);
    if let Ok(path) = env::var("VISIONCARE_CALIBRATION_OUT") {
        record.save(&path)?;
        log::info!("Calibration record written to {}", path);
    }

    // Release the simulated user's gaze for tracking
    if let Ok(look) = follower.await {
        look.set_look_at(Point2::new(0.5, 0.5));
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    session.connect_output(tx);
    let consumer = std::thread::spawn(move || {
        for gaze in rx.iter() {
            log::debug!(
                "gaze screen=({:.3}, {:.3}) face={} ear={:.3}",
                gaze.screen.x,
                gaze.screen.y,
                gaze.face_detected,
                gaze.blink.ear
            );
        }
    });

    log::info!("Tracking... Press Ctrl+C to exit");
    log::info!("───────────────────────────────────────");
    session.run(&cancel).await?;

    // Shutdown gracefully
    session.shutdown().await?;
    drop(session);
    if consumer.join().is_err() {
        log::warn!("Gaze consumer thread panicked");
    }

    log::info!("VisionCare Gaze shutdown complete");
    Ok(())
}
