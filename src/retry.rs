//! Detached retry scheduling for signal-driven loops
//!
//! A failed iteration does not sleep inline. It spawns a timer task that waits
//! for the retry delay and then re-sends a signal on the loop's own channel, so
//! the loop stays free to handle other signals and still processes one at a
//! time.
//!
//! There is no cancellation: once scheduled, a retry fires. Loops are expected
//! to re-check their preconditions on every signal.

use std::fmt::Display;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default delay before a failed certificate poll is retried
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Re-injects a signal into a loop after a fixed delay
#[derive(Clone, Debug)]
pub struct RetryScheduler {
    signal: mpsc::Sender<()>,
    delay: Duration,
}

impl RetryScheduler {
    /// Create a scheduler that re-signals `signal` after `delay`
    pub fn new(signal: mpsc::Sender<()>, delay: Duration) -> Self {
        Self { signal, delay }
    }

    /// Delay between a failure and the retry signal
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Log the failure and schedule one retry signal
    pub fn schedule(&self, operation: &str, reason: &dyn Display) {
        warn!(
            operation = %operation,
            reason = %reason,
            delay_secs = self.delay.as_secs(),
            "Operation did not complete, retrying later"
        );

        let signal = self.signal.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Waits for capacity if the loop already has signals queued
            if signal.send(()).await.is_err() {
                debug!("Retry signal dropped, loop has stopped");
            }
        });
    }
}
