//! Schema build progress reporting.

use std::sync::Mutex;

/// Receives build progress. Steps are relative weights out of the total the
/// reporter was created with.
pub trait ProgressReporter: Send + Sync {
    fn tick(&self, message: &str, step: f64);

    /// The build failed.
    fn terminate(&self, message: &str);
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn tick(&self, _message: &str, _step: f64) {}

    fn terminate(&self, _message: &str) {}
}

/// Logs progress as a percentage through `tracing`.
#[derive(Debug)]
pub struct TracingProgress {
    total: f64,
    current: Mutex<f64>,
}

impl TracingProgress {
    pub fn new(total: f64) -> Self {
        Self {
            total: total.max(1.0),
            current: Mutex::new(0.0),
        }
    }

    pub fn percent(&self) -> f64 {
        self.current
            .lock()
            .map(|current| (*current / self.total * 100.0).min(100.0))
            .unwrap_or(0.0)
    }
}

impl ProgressReporter for TracingProgress {
    fn tick(&self, message: &str, step: f64) {
        if let Ok(mut current) = self.current.lock() {
            *current = (*current + step).min(self.total);
        }
        tracing::info!(percent = self.percent().round() as u64, "{}", message);
    }

    fn terminate(&self, message: &str) {
        tracing::error!(
            percent = self.percent().round() as u64,
            "schema build failed: {}",
            message
        );
    }
}
