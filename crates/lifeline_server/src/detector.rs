#![forbid(unsafe_code)]

use lifeline_contracts::{EmergencyRecord, EpochTimeMs};

pub const INTERACTION_STALE_MS: u64 = 2 * 3_600_000;
pub const MOVEMENT_STALE_MS: u64 = 3_600_000;
pub const UPDATE_STALE_MS: u64 = 4 * 3_600_000;

/// Pure emergency verdict over one record.
///
/// A reported positive flag counts as fully fresh (age zero); a negative
/// flag ages at the rate of staleness since the last report, which is the
/// right granularity for interval polling rather than continuous telemetry.
/// Sleep time exempts the two behavioral criteria only; the charging/update
/// criterion is a device-health signal and fires regardless of sleep.
pub fn evaluate_emergency(record: &EmergencyRecord, now: EpochTimeMs) -> bool {
    let update_age = now.age_since(record.last_update);
    let interaction_age = if record.last_interaction { 0 } else { update_age };
    let movement_age = if record.last_movement { 0 } else { update_age };

    (!record.is_sleep_time && interaction_age > INTERACTION_STALE_MS)
        || (!record.is_sleep_time && movement_age > MOVEMENT_STALE_MS)
        || (!record.is_charging && update_age > UPDATE_STALE_MS)
}
