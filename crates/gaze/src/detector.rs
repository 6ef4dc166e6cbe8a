//! Face detector lifecycle
//!
//! The landmark model itself lives outside this crate. A session owns one
//! [`DetectorHandle`], which tracks init/dispose and refuses overlapping
//! calls so a slow (or remote) detector never sees request fan-out.

use crate::error::{GazeError, Result};
use crate::types::LandmarkFrame;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// External facial-landmark detector
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Load models, open devices, etc.
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Landmarks for the current frame, `Ok(None)` when no face is visible
    async fn detect(&self) -> Result<Option<LandmarkFrame>>;

    /// Release whatever `init` acquired
    async fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Owned detector with lifecycle and in-flight tracking
pub struct DetectorHandle<D> {
    inner: D,
    initialized: bool,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag even when the detect future is dropped early
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<D: FaceDetector> DetectorHandle<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            initialized: false,
            in_flight: AtomicBool::new(false),
        }
    }

    pub async fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        log::info!("Initializing face detector...");
        self.inner.init().await?;
        self.initialized = true;
        Ok(())
    }

    pub async fn dispose(&mut self) -> Result<()> {
        if !self.initialized {
            return Ok(());
        }
        log::info!("Disposing face detector");
        self.initialized = false;
        self.inner.dispose().await
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// One detector call; fails with `DetectorBusy` if another is in flight
    pub async fn detect(&self) -> Result<Option<LandmarkFrame>> {
        if !self.initialized {
            return Err(GazeError::DetectorNotInitialized);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(GazeError::DetectorBusy);
        }
        let _guard = InFlight(&self.in_flight);
        self.inner.detect().await
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}
