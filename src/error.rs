//! Error types for Pacekeeper
//!
//! Only configuration problems, I/O and cancellation are errors. Rate-limit,
//! circuit-breaker and operating-window rejections are ordinary values
//! (see [`crate::limiter::Admission`] and [`crate::schedule::ScheduleStatus`]).

use thiserror::Error;

/// Errors that can occur while building or driving the governance engine
#[derive(Debug, Error)]
pub enum GovernError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid operating hours: start {start} must be before end {end} (both within 0-24)")]
    InvalidHourRange { start: u32, end: u32 },

    #[error("Invalid break window: {0}")]
    InvalidBreak(String),

    #[error("Invalid workday: {0}")]
    InvalidWorkday(String),

    #[error("Invalid timing profile: {0}")]
    InvalidTiming(String),

    #[error("Invalid range for {name}: {min} > {max}")]
    InvalidRange { name: String, min: f64, max: f64 },

    #[error("Invalid membership filter parameters: {0}")]
    InvalidFilter(String),

    #[error("Invalid rate limit: {0}")]
    InvalidLimit(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input surface failed: {0}")]
    Surface(String),

    #[error("Wait cancelled")]
    Cancelled,
}

impl GovernError {
    /// True for errors raised while validating configuration
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            GovernError::InvalidTimezone(_)
                | GovernError::InvalidHourRange { .. }
                | GovernError::InvalidBreak(_)
                | GovernError::InvalidWorkday(_)
                | GovernError::InvalidTiming(_)
                | GovernError::InvalidRange { .. }
                | GovernError::InvalidFilter(_)
                | GovernError::InvalidLimit(_)
                | GovernError::Config(_)
        )
    }
}
