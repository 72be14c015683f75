// src/utils/performance.rs

use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Times an operation and logs its duration when finished.
///
/// Operations slower than the warning threshold are logged at `warn`.
pub struct OperationTimer {
    operation: &'static str,
    start_time: Instant,
    warn_threshold: Option<Duration>,
}

impl OperationTimer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            start_time: Instant::now(),
            warn_threshold: None,
        }
    }

    pub fn with_warn_threshold(mut self, threshold: Duration) -> Self {
        self.warn_threshold = Some(threshold);
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log the duration and return it.
    pub fn finish(self) -> Duration {
        let duration = self.start_time.elapsed();
        match self.warn_threshold {
            Some(threshold) if duration > threshold => {
                warn!(
                    operation = self.operation,
                    duration_ms = duration.as_millis() as u64,
                    threshold_ms = threshold.as_millis() as u64,
                    "Operation exceeded warning threshold"
                );
            }
            _ => {
                debug!(
                    operation = self.operation,
                    duration_ms = duration.as_millis() as u64,
                    "Operation completed"
                );
            }
        }
        duration
    }
}
