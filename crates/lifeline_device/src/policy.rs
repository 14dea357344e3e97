#![forbid(unsafe_code)]

use std::env;

use lifeline_contracts::{ContractViolation, EpochTimeMs, MinuteOfDay};

pub const QUIET_START_MINUTE_DEFAULT: u16 = 21 * 60;
pub const QUIET_END_MINUTE_DEFAULT: u16 = 6 * 60;

/// Daily `[start, end)` suppression window in minutes-of-day; may wrap
/// midnight. During the window the evaluator does not transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHoursPolicy {
    start: MinuteOfDay,
    end: MinuteOfDay,
}

impl QuietHoursPolicy {
    pub fn new(start: MinuteOfDay, end: MinuteOfDay) -> Self {
        Self { start, end }
    }

    pub fn mvp_v1() -> Self {
        Self {
            start: MinuteOfDay(QUIET_START_MINUTE_DEFAULT),
            end: MinuteOfDay(QUIET_END_MINUTE_DEFAULT),
        }
    }

    pub fn from_env() -> Result<Self, ContractViolation> {
        let start = env::var("LIFELINE_QUIET_START_MIN")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(QUIET_START_MINUTE_DEFAULT);
        let end = env::var("LIFELINE_QUIET_END_MIN")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(QUIET_END_MINUTE_DEFAULT);
        Ok(Self {
            start: MinuteOfDay::new(start)?,
            end: MinuteOfDay::new(end)?,
        })
    }

    /// `[start, end)` membership. A wrapping window (`start > end`) contains
    /// `t` iff `t >= start || t < end`; equal bounds mean an empty window.
    pub fn contains(&self, minute: MinuteOfDay) -> bool {
        if self.start == self.end {
            return false;
        }
        if self.start > self.end {
            minute >= self.start || minute < self.end
        } else {
            minute >= self.start && minute < self.end
        }
    }
}

/// A signal is stale when it was never observed, or when more than
/// `threshold_ms` has passed since the last observation.
pub fn is_stale_by(threshold_ms: u64, last_event: Option<EpochTimeMs>, now: EpochTimeMs) -> bool {
    match last_event {
        Some(at) => now.age_since(at) > threshold_ms,
        None => true,
    }
}
