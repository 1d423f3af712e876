//! Bounded retry bookkeeping for status queries

use std::time::{Duration, Instant};

use cca_device::{DeviceError, MediaStatus};

/// Outcome of one status query
#[derive(Debug, Clone, PartialEq)]
pub enum StatusProbe {
    /// The query succeeded; `None` means nothing is loaded
    Ok(Option<MediaStatus>),
    /// The query failed but the device may come back
    Transient(DeviceError),
    /// The device handle is gone
    Disconnected(DeviceError),
}

impl From<cca_device::Result<Option<MediaStatus>>> for StatusProbe {
    fn from(result: cca_device::Result<Option<MediaStatus>>) -> Self {
        match result {
            Ok(status) => StatusProbe::Ok(status),
            Err(e) if e.is_transient() => StatusProbe::Transient(e),
            Err(e) => StatusProbe::Disconnected(e),
        }
    }
}

/// Tracks an unbroken streak of failed status queries.
///
/// The streak starts at the first failure. Once it has lasted for the
/// configured window the device is declared disconnected.
#[derive(Debug, Clone)]
pub struct FailureWindow {
    window: Duration,
    consecutive_failures: u32,
    window_start: Option<Instant>,
}

impl FailureWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            consecutive_failures: 0,
            window_start: None,
        }
    }

    /// Record a failure at `now`. Returns `true` once the streak has lasted
    /// at least the window.
    pub fn record_failure(&mut self, now: Instant) -> bool {
        let start = *self.window_start.get_or_insert(now);
        self.consecutive_failures += 1;
        now.saturating_duration_since(start) >= self.window
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.window_start = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn window_start(&self) -> Option<Instant> {
        self.window_start
    }
}
