//! Round clock for the grace window
//!
//! Process-wide, reset by the external round-start signal. The start time
//! is a single atomic so a concurrent event always sees either the old or
//! the new value.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

const NOT_STARTED: i64 = i64::MIN;

#[derive(Debug)]
pub struct RoundClock {
    /// Round start in unix milliseconds
    started_millis: AtomicI64,
}

impl RoundClock {
    pub fn new() -> Self {
        Self {
            started_millis: AtomicI64::new(NOT_STARTED),
        }
    }

    pub fn reset(&self, at: DateTime<Utc>) {
        self.started_millis
            .store(at.timestamp_millis(), Ordering::Release);
    }

    /// Snapshot of the current round start
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self.started_millis.load(Ordering::Acquire) {
            NOT_STARTED => None,
            millis => Utc.timestamp_millis_opt(millis).single(),
        }
    }

    /// Whether `at` falls inside the grace window after the last round start
    pub fn in_grace(&self, at: DateTime<Utc>, grace_secs: u64) -> bool {
        if grace_secs == 0 {
            return false;
        }
        let Some(start) = self.started_at() else {
            return false;
        };
        if at < start {
            return false;
        }
        let grace = Duration::seconds(grace_secs.min(i64::MAX as u64 / 1000) as i64);
        // A window ending past the representable range never closes
        match start.checked_add_signed(grace) {
            Some(end) => at < end,
            None => true,
        }
    }
}

impl Default for RoundClock {
    fn default() -> Self {
        Self::new()
    }
}
