//! Backoff for failing listener accepts
//!
//! A listener that keeps failing (descriptor exhaustion, for instance) would
//! otherwise spin its accept loop and flood the log.

use std::io;
use std::time::Duration;

use tracing::warn;

const INITIAL_DELAY: Duration = Duration::from_millis(10);

/// Exponential pause between consecutive accept failures
#[derive(Debug, Clone)]
pub struct AcceptBackoff {
    label: &'static str,
    max: Duration,
    delay: Duration,
    failures: u64,
}

impl AcceptBackoff {
    pub fn new(label: &'static str, max: Duration) -> Self {
        Self {
            label,
            max,
            delay: INITIAL_DELAY.min(max),
            failures: 0,
        }
    }

    /// Record a failure and return how long to pause before accepting again
    ///
    /// Only the first failure of a run and every power-of-two after it are
    /// logged.
    pub fn failed(&mut self, err: &io::Error) -> Duration {
        self.failures += 1;
        if self.should_log() {
            warn!(
                "{} accept error ({} consecutive): {}",
                self.label, self.failures, err
            );
        }

        let pause = self.delay;
        self.delay = (self.delay * 2).min(self.max);
        pause
    }

    /// Clear the failure run after a successful accept
    pub fn reset(&mut self) {
        self.failures = 0;
        self.delay = INITIAL_DELAY.min(self.max);
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    fn should_log(&self) -> bool {
        self.failures.is_power_of_two()
    }
}
