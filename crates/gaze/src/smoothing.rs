//! Exponential moving average over gaze coordinates

use crate::config::SmoothingConfig;

/// Smallest usable alpha; zero would freeze the output forever
const MIN_ALPHA: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingState {
    pub alpha: f64,
    pub smoothed_x: Option<f64>,
    pub smoothed_y: Option<f64>,
}

/// Per-axis EMA. Higher alpha tracks input faster, lower alpha is smoother.
#[derive(Debug, Clone)]
pub struct EmaSmoother {
    state: SmoothingState,
}

impl EmaSmoother {
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(MIN_ALPHA, 1.0)
        } else {
            SmoothingConfig::default().alpha
        };
        Self {
            state: SmoothingState {
                alpha,
                smoothed_x: None,
                smoothed_y: None,
            },
        }
    }

    pub fn from_config(config: &SmoothingConfig) -> Self {
        Self::new(config.alpha)
    }

    pub fn smooth(&mut self, x: f64, y: f64) -> (f64, f64) {
        let alpha = self.state.alpha;
        let blend = |prev: Option<f64>, input: f64| match prev {
            Some(s) => alpha * input + (1.0 - alpha) * s,
            None => input,
        };

        let sx = blend(self.state.smoothed_x, x);
        let sy = blend(self.state.smoothed_y, y);
        self.state.smoothed_x = Some(sx);
        self.state.smoothed_y = Some(sy);
        (sx, sy)
    }

    pub fn reset(&mut self) {
        self.state.smoothed_x = None;
        self.state.smoothed_y = None;
    }

    pub fn alpha(&self) -> f64 {
        self.state.alpha
    }

    pub fn state(&self) -> &SmoothingState {
        &self.state
    }
}

impl Default for EmaSmoother {
    fn default() -> Self {
        Self::from_config(&SmoothingConfig::default())
    }
}
