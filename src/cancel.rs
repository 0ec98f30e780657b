//! Cooperative cancellation for long waits
//!
//! Every wait in the engine (operating-window polling, backoff waits, plan
//! playback) is split into short segments. The token is checked between
//! segments, never in the middle of one, so a cancelled wait returns within one
//! segment length.

use crate::error::GovernError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Longest uninterrupted sleep inside a cancellable wait
pub const SLEEP_SEGMENT: Duration = Duration::from_secs(1);

/// Shared cancellation signal checked at wait boundaries
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal cancellation to every clone of this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<(), GovernError> {
        if self.is_cancelled() {
            Err(GovernError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep for `total`, checking `token` before each segment
pub async fn sleep_cancellable(
    total: Duration,
    token: &CancellationToken,
) -> Result<(), GovernError> {
    let mut remaining = total;
    loop {
        token.check()?;
        if remaining.is_zero() {
            return Ok(());
        }
        let segment = remaining.min(SLEEP_SEGMENT);
        tokio::time::sleep(segment).await;
        remaining -= segment;
    }
}
