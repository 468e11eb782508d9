//! Conversions between the poll service's nanosecond timestamps and the local
//! millisecond clock, plus the countdown arithmetic built on top of them.
//!
//! Everything here is a pure function of its inputs; "now" is always passed in
//! or read from a [`Clock`] so the same `(end_time, now)` pair renders the same
//! way every time.
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::models::Timestamp;

const NANOS_PER_MILLI: i64 = 1_000_000;

/**
 * Text shown in place of a countdown once the end time has passed
 */
pub const VOTING_CLOSED: &str = "Voting closed";

/**
 * Convert a service timestamp to milliseconds, truncating towards zero
 */
pub fn nanos_to_millis(ts: Timestamp) -> i64 {
    ts.0 / NANOS_PER_MILLI
}

pub fn millis_to_nanos(millis: i64) -> Timestamp {
    Timestamp(millis.saturating_mul(NANOS_PER_MILLI))
}

/**
 * Remaining duration until an end time, split into display units
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeRemaining {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub is_expired: bool,
}

impl TimeRemaining {
    fn expired() -> Self {
        TimeRemaining {
            is_expired: true,
            ..Default::default()
        }
    }
}

/**
 * Duration arithmetic only: a day is always 24 hours, no calendar involved.
 */
pub fn time_remaining(end_time: Timestamp, now_millis: i64) -> TimeRemaining {
    let remaining = nanos_to_millis(end_time).saturating_sub(now_millis);

    if remaining <= 0 {
        return TimeRemaining::expired();
    }

    let seconds = remaining / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    TimeRemaining {
        days,
        hours: hours % 24,
        minutes: minutes % 60,
        seconds: seconds % 60,
        is_expired: false,
    }
}

/**
 * Render the remaining time with the largest unit and the one below it,
 * e.g. "2d 3h remaining" or "5m 12s remaining".
 */
pub fn format_time_remaining(end_time: Timestamp, now_millis: i64) -> String {
    let r = time_remaining(end_time, now_millis);

    if r.is_expired {
        VOTING_CLOSED.to_string()
    } else if r.days > 0 {
        format!("{}d {}h remaining", r.days, r.hours)
    } else if r.hours > 0 {
        format!("{}h {}m remaining", r.hours, r.minutes)
    } else if r.minutes > 0 {
        format!("{}m {}s remaining", r.minutes, r.seconds)
    } else {
        format!("{}s remaining", r.seconds)
    }
}

/**
 * Source of local wall-clock time in milliseconds since the Unix epoch
 */
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/**
 * A clock that only moves when told to
 */
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_millis: i64) -> Self {
        ManualClock {
            now: AtomicI64::new(now_millis),
        }
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
