//! Resend countdown: resend is allowed only once the timer reaches zero.
//!
//! The timer runs on a background task ticking once per second. Dropping the
//! [`ResendGate`] (for example when its browser context is evicted) aborts the
//! task, so no tick ever fires against a torn-down context.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use super::error::AuthError;

/// Seconds between a send/resend and the next allowed resend.
pub const RESEND_COUNTDOWN_SECONDS: u64 = 600;

pub struct ResendGate {
    remaining: Arc<AtomicU64>,
    start: u64,
    ticker: JoinHandle<()>,
}

impl ResendGate {
    /// Start a countdown at `start` seconds. Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(start: u64) -> Self {
        let remaining = Arc::new(AtomicU64::new(start));
        let ticker = tokio::spawn(tick(remaining.clone()));
        Self {
            remaining,
            start,
            ticker,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn can_resend(&self) -> bool {
        self.remaining() == 0
    }

    /// Restart the countdown from its initial value.
    pub fn reset(&self) {
        self.remaining.store(self.start, Ordering::SeqCst);
    }

    /// Check the gate before a resend.
    ///
    /// # Errors
    /// Returns `ResendCooldown` with the seconds left while the countdown runs.
    pub fn check(&self) -> Result<(), AuthError> {
        match self.remaining() {
            0 => Ok(()),
            remaining_seconds => Err(AuthError::ResendCooldown { remaining_seconds }),
        }
    }

    /// Remaining time as `m:ss`.
    #[must_use]
    pub fn display(&self) -> String {
        format_remaining(self.remaining())
    }

    /// Stop ticking without dropping the gate.
    pub fn stop(&self) {
        self.ticker.abort();
    }
}

impl Drop for ResendGate {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

async fn tick(remaining: Arc<AtomicU64>) {
    let mut ticks = interval(Duration::from_secs(1));
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticks.tick().await;
    loop {
        ticks.tick().await;
        let _ = remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| {
            value.checked_sub(1)
        });
    }
}

#[must_use]
pub fn format_remaining(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
