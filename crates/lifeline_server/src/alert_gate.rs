#![forbid(unsafe_code)]

use lifeline_contracts::EpochTimeMs;

/// Minimum spacing between two dispatched alerts for the same user.
pub const ALERT_COOLDOWN_MS: u64 = 30 * 60_000;

/// Cooldown check for one user. Callers run this under the user's slot lock
/// and, on a passing verdict, must record `last_alert_at = now` before the
/// lock is released (test-and-set, never test-then-set), so two concurrent
/// triggers cannot both pass.
pub fn should_alert(last_alert_at: Option<EpochTimeMs>, now: EpochTimeMs) -> bool {
    match last_alert_at {
        Some(at) => now.age_since(at) >= ALERT_COOLDOWN_MS,
        None => true,
    }
}
