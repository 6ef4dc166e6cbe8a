//! Calibration engine
//!
//! Walks the configured grid of screen targets, samples raw gaze from an
//! [`ObservationSource`] while the user fixates each one, and reduces the
//! samples to one [`CalibrationPoint`] per target.
//!
//! Per target the loop waits `settle_delay`, then takes one observation every
//! `sample_interval` until `samples_per_point` valid samples are in, or
//! `max_attempts_per_point` attempts were made, or `target_timeout` has
//! passed. Whatever was collected by then is used if it reaches
//! `min_samples_per_point`; otherwise the target yields no point and the run
//! moves on. Nothing is committed until the run reaches `Done`.

use crate::config::CalibrationConfig;
use crate::error::{GazeError, Result};
use crate::mapper::MIN_CALIBRATION_POINTS;
use crate::types::{CalibrationPoint, Point2};
use crate::vision::ObservationSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationState {
    #[default]
    Idle,
    /// Sampling the target at this index
    CollectingPoint(usize),
    Finalizing,
    Done,
    Cancelled,
    Failed {
        collected: usize,
        required: usize,
    },
}

impl CalibrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CollectingPoint(_) => "collecting",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Cooperative cancellation flag shared between a run and its controller
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot published to subscribers on every state or sample change
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationProgress {
    pub state: CalibrationState,
    pub target_index: usize,
    /// Screen position of the current target
    pub target: Option<Point2>,
    /// Valid samples for the current target so far
    pub samples_collected: usize,
    /// Targets that produced a point so far in this run
    pub points_collected: usize,
    pub total_targets: usize,
}

/// Average of a target's raw samples
pub fn reduce_samples(samples: &[Point2]) -> Option<Point2> {
    Point2::mean(samples)
}

pub struct CalibrationEngine {
    config: CalibrationConfig,
    targets: Vec<Point2>,
    state: CalibrationState,
    progress: watch::Sender<CalibrationProgress>,
}

impl CalibrationEngine {
    pub fn new(config: CalibrationConfig) -> Self {
        let targets = config.targets();
        let (progress, _) = watch::channel(CalibrationProgress {
            total_targets: targets.len(),
            ..Default::default()
        });
        Self {
            config,
            targets,
            state: CalibrationState::Idle,
            progress,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CalibrationProgress> {
        self.progress.subscribe()
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn targets(&self) -> &[Point2] {
        &self.targets
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    fn required_points(&self) -> usize {
        self.config.min_points.max(MIN_CALIBRATION_POINTS)
    }

    fn publish(&mut self, state: CalibrationState, index: usize, samples: usize, points: usize) {
        self.state = state;
        self.progress.send_replace(CalibrationProgress {
            state,
            target_index: index,
            target: self.targets.get(index).copied(),
            samples_collected: samples,
            points_collected: points,
            total_targets: self.targets.len(),
        });
    }

    fn cancelled(&mut self, index: usize) -> Result<Vec<CalibrationPoint>> {
        log::info!("Calibration cancelled at target {}", index + 1);
        self.publish(CalibrationState::Cancelled, index, 0, 0);
        Err(GazeError::Cancelled)
    }

    /// Run a full calibration. Returns the points on `Done`; the caller
    /// decides whether to commit them.
    pub async fn run<S>(
        &mut self,
        source: &S,
        cancel: &CancelToken,
    ) -> Result<Vec<CalibrationPoint>>
    where
        S: ObservationSource + ?Sized,
    {
        let total = self.targets.len();
        log::info!("Starting calibration over {} targets", total);
        self.publish(CalibrationState::Idle, 0, 0, 0);

        let mut points = Vec::with_capacity(total);

        for index in 0..total {
            if cancel.is_cancelled() {
                return self.cancelled(index);
            }

            let target = self.targets[index];
            log::info!(
                "Calibration target {}/{} at ({:.2}, {:.2})",
                index + 1,
                total,
                target.x,
                target.y
            );
            self.publish(CalibrationState::CollectingPoint(index), index, 0, points.len());

            sleep(self.config.settle_delay()).await;
            if cancel.is_cancelled() {
                return self.cancelled(index);
            }

            let collected = self.collect_target(source, cancel, index, points.len()).await;
            let Some(samples) = collected else {
                return self.cancelled(index);
            };

            if samples.len() >= self.config.min_samples_per_point {
                if let Some(raw) = reduce_samples(&samples) {
                    points.push(CalibrationPoint { screen: target, raw });
                }
            } else {
                log::warn!(
                    "Target {} yielded {} valid samples, skipping",
                    index + 1,
                    samples.len()
                );
            }
        }

        let last = total.saturating_sub(1);
        self.publish(CalibrationState::Finalizing, last, 0, points.len());

        let required = self.required_points();
        if points.len() < required {
            log::warn!(
                "Calibration failed: {} of {} required points",
                points.len(),
                required
            );
            self.publish(
                CalibrationState::Failed {
                    collected: points.len(),
                    required,
                },
                last,
                0,
                points.len(),
            );
            return Err(GazeError::InsufficientCalibrationData {
                collected: points.len(),
                required,
            });
        }

        log::info!("Calibration complete: {} points", points.len());
        self.publish(CalibrationState::Done, last, 0, points.len());
        Ok(points)
    }

    /// Sample one target. `None` means the run was cancelled.
    async fn collect_target<S>(
        &mut self,
        source: &S,
        cancel: &CancelToken,
        index: usize,
        points: usize,
    ) -> Option<Vec<Point2>>
    where
        S: ObservationSource + ?Sized,
    {
        let wanted = self.config.samples_per_point;
        let deadline = Instant::now() + self.config.target_timeout();
        let mut samples = Vec::with_capacity(wanted);
        let mut attempts = 0;

        while samples.len() < wanted {
            if attempts >= self.config.max_attempts_per_point {
                log::warn!("Target {}: giving up after {} attempts", index + 1, attempts);
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!("Target {}: deadline passed after {} attempts", index + 1, attempts);
                break;
            }
            if cancel.is_cancelled() {
                return None;
            }

            attempts += 1;
            let call_timeout = self
                .config
                .detector_timeout()
                .min(deadline.saturating_duration_since(now));

            let result = timeout(call_timeout, source.observe()).await;
            // An observation that finished after cancellation is discarded
            if cancel.is_cancelled() {
                return None;
            }

            match result {
                Err(_) => {
                    let e = GazeError::DetectorTimeout(call_timeout);
                    log::warn!("Target {}: {}", index + 1, e)
                }
                Ok(Err(e)) => log::warn!("Target {}: sample skipped: {}", index + 1, e),
                Ok(Ok(None)) => log::debug!("Target {}: no face", index + 1),
                Ok(Ok(Some(obs))) if !obs.eyes.both_open() => {
                    log::debug!("Target {}: eyes not open, sample skipped", index + 1)
                }
                Ok(Ok(Some(obs))) if !obs.raw.is_finite() => {
                    log::debug!("Target {}: undefined gaze, sample skipped", index + 1)
                }
                Ok(Ok(Some(obs))) => {
                    samples.push(obs.raw);
                    self.publish(
                        CalibrationState::CollectingPoint(index),
                        index,
                        samples.len(),
                        points,
                    );
                }
            }

            if samples.len() < wanted {
                sleep(self.config.sample_interval()).await;
            }
        }

        Some(samples)
    }
}
