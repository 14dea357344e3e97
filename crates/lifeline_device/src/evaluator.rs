#![forbid(unsafe_code)]

use std::env;

use lifeline_contracts::wire::SnapshotUpload;
use lifeline_contracts::{ContractViolation, EpochTimeMs};

use crate::policy::{is_stale_by, QuietHoursPolicy};
use crate::signal_cache::{LocalSignalState, SharedSignalCache};
use crate::uplink::UplinkRuntime;

pub const TICK_INTERVAL_MS_DEFAULT: u64 = 15 * 60_000;
/// Pre-send gate: transmit only when interaction AND movement are both at
/// least this stale. This is a bandwidth/battery economizer; the emergency
/// verdict itself is computed server-side from richer signals.
pub const PRESEND_BOTH_STALE_MS: u64 = 2 * 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluatorPhase {
    Idle,
    Deciding,
    Suppressed,
    Skipped,
    Transmitting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Suppressed,
    Skipped,
    Transmitted,
    TransmitFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatorConfig {
    pub tick_interval_ms: u64,
    pub quiet_hours: QuietHoursPolicy,
    pub presend_stale_ms: u64,
    pub utc_offset_min: i16,
}

impl EvaluatorConfig {
    pub fn mvp_v1() -> Self {
        Self {
            tick_interval_ms: TICK_INTERVAL_MS_DEFAULT,
            quiet_hours: QuietHoursPolicy::mvp_v1(),
            presend_stale_ms: PRESEND_BOTH_STALE_MS,
            utc_offset_min: 0,
        }
    }

    pub fn from_env() -> Result<Self, ContractViolation> {
        let tick_interval_ms = env::var("LIFELINE_TICK_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (1_000..=3_600_000).contains(v))
            .unwrap_or(TICK_INTERVAL_MS_DEFAULT);
        let utc_offset_min = env::var("LIFELINE_UTC_OFFSET_MIN")
            .ok()
            .and_then(|v| v.parse::<i16>().ok())
            .filter(|v| (-840..=840).contains(v))
            .unwrap_or(0);
        Ok(Self {
            tick_interval_ms,
            quiet_hours: QuietHoursPolicy::from_env()?,
            presend_stale_ms: PRESEND_BOTH_STALE_MS,
            utc_offset_min,
        })
    }
}

/// Fixed-tick decision loop: on every tick the machine walks
/// `Idle -> Deciding -> {Suppressed, Skipped, Transmitting} -> Idle` and
/// reports the outcome. Nothing is persisted across restarts; a restarted
/// agent simply re-arms from `Idle`.
#[derive(Debug)]
pub struct PeriodicEvaluator {
    config: EvaluatorConfig,
    cache: SharedSignalCache,
    uplink: UplinkRuntime,
    phase: EvaluatorPhase,
}

impl PeriodicEvaluator {
    pub fn new(config: EvaluatorConfig, cache: SharedSignalCache, uplink: UplinkRuntime) -> Self {
        Self {
            config,
            cache,
            uplink,
            phase: EvaluatorPhase::Idle,
        }
    }

    pub fn phase(&self) -> EvaluatorPhase {
        self.phase
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn run_tick(&mut self, now: EpochTimeMs) -> TickOutcome {
        self.phase = EvaluatorPhase::Deciding;
        let state = self.cache.snapshot();
        let outcome = self.decide_and_transmit(&state, now);
        self.phase = EvaluatorPhase::Idle;
        outcome
    }

    fn decide_and_transmit(&mut self, state: &LocalSignalState, now: EpochTimeMs) -> TickOutcome {
        let minute = now.minute_of_day(self.config.utc_offset_min);
        if self.config.quiet_hours.contains(minute) {
            self.phase = EvaluatorPhase::Suppressed;
            return TickOutcome::Suppressed;
        }

        let no_interaction = is_stale_by(
            self.config.presend_stale_ms,
            state.last_interaction_at,
            now,
        );
        let no_movement =
            is_stale_by(self.config.presend_stale_ms, state.last_movement_at, now);
        if !(no_interaction && no_movement) {
            self.phase = EvaluatorPhase::Skipped;
            return TickOutcome::Skipped;
        }

        self.phase = EvaluatorPhase::Transmitting;
        let Some(token) = state.auth_token.as_deref() else {
            return TickOutcome::TransmitFailed {
                reason: "no auth token cached".to_string(),
            };
        };
        let upload = build_snapshot_upload(state);
        match self.uplink.submit(token, &upload) {
            Ok(()) => TickOutcome::Transmitted,
            Err(err) => TickOutcome::TransmitFailed {
                reason: err.to_string(),
            },
        }
    }
}

/// Best-known location as a map link, or the literal `"N/A"` when either
/// coordinate was never observed. The string is a compatibility contract
/// with the alert message body and must pass through unchanged.
pub fn render_location(latitude: Option<&str>, longitude: Option<&str>) -> String {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => format!("https://maps.google.com/?q={lat},{lon}"),
        _ => "N/A".to_string(),
    }
}

pub fn build_snapshot_upload(state: &LocalSignalState) -> SnapshotUpload {
    let contact = |idx: usize| state.contacts.get(idx).cloned().unwrap_or_default();
    SnapshotUpload {
        user_name: state.user_name.clone(),
        contact1: contact(0),
        contact2: contact(1),
        contact3: contact(2),
        location: render_location(
            state.last_latitude.as_deref(),
            state.last_longitude.as_deref(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: u64 = 3_600_000;

    // 12:00 local on day zero, outside the default quiet window
    fn noon() -> EpochTimeMs {
        EpochTimeMs(12 * HOUR_MS)
    }

    fn evaluator_with(cache: SharedSignalCache, uplink: UplinkRuntime) -> PeriodicEvaluator {
        PeriodicEvaluator::new(EvaluatorConfig::mvp_v1(), cache, uplink)
    }

    fn seed_profile(cache: &SharedSignalCache) {
        cache.set_profile("Maria".to_string(), vec!["a@example.com".to_string()]);
        cache.set_auth_token("tok".to_string());
    }

    #[test]
    fn at_evaluator_01_quiet_hours_suppresses() {
        let cache = SharedSignalCache::new();
        seed_profile(&cache);
        let mut evaluator = evaluator_with(cache, UplinkRuntime::Loopback);

        let eleven_pm = EpochTimeMs(23 * HOUR_MS);
        assert_eq!(evaluator.run_tick(eleven_pm), TickOutcome::Suppressed);
        assert_eq!(evaluator.phase(), EvaluatorPhase::Idle);
    }

    #[test]
    fn at_evaluator_02_both_signals_stale_transmits() {
        let cache = SharedSignalCache::new();
        seed_profile(&cache);
        let now = noon();
        cache.record_interaction(now.minus_ms(3 * HOUR_MS));
        cache.record_movement(now.minus_ms(3 * HOUR_MS));

        let mut evaluator = evaluator_with(cache, UplinkRuntime::Loopback);
        assert_eq!(evaluator.run_tick(now), TickOutcome::Transmitted);
    }

    #[test]
    fn at_evaluator_03_fresh_movement_skips() {
        let cache = SharedSignalCache::new();
        seed_profile(&cache);
        let now = noon();
        cache.record_interaction(now.minus_ms(3 * HOUR_MS));
        cache.record_movement(now.minus_ms(HOUR_MS));

        let mut evaluator = evaluator_with(cache, UplinkRuntime::Loopback);
        assert_eq!(evaluator.run_tick(now), TickOutcome::Skipped);
    }

    #[test]
    fn at_evaluator_04_never_observed_signals_count_as_stale() {
        let cache = SharedSignalCache::new();
        seed_profile(&cache);
        let mut evaluator = evaluator_with(cache, UplinkRuntime::Loopback);
        assert_eq!(evaluator.run_tick(noon()), TickOutcome::Transmitted);
    }

    #[test]
    fn at_evaluator_05_uplink_failure_is_reported_not_retried() {
        let cache = SharedSignalCache::new();
        seed_profile(&cache);
        let mut evaluator =
            evaluator_with(cache, UplinkRuntime::always_fail_for_tests("offline"));
        match evaluator.run_tick(noon()) {
            TickOutcome::TransmitFailed { reason } => {
                assert!(reason.contains("offline"));
            }
            other => panic!("expected transmit failure, got {other:?}"),
        }
        assert_eq!(evaluator.phase(), EvaluatorPhase::Idle);
    }

    #[test]
    fn at_evaluator_06_missing_token_fails_without_network() {
        let cache = SharedSignalCache::new();
        cache.set_profile("Maria".to_string(), vec![]);
        let mut evaluator = evaluator_with(cache, UplinkRuntime::Loopback);
        match evaluator.run_tick(noon()) {
            TickOutcome::TransmitFailed { reason } => {
                assert!(reason.contains("token"));
            }
            other => panic!("expected transmit failure, got {other:?}"),
        }
    }

    #[test]
    fn at_evaluator_07_snapshot_location_rendering() {
        let state = LocalSignalState {
            last_latitude: Some("1".to_string()),
            last_longitude: Some("2".to_string()),
            user_name: "Maria".to_string(),
            contacts: vec!["a@example.com".to_string()],
            ..LocalSignalState::default()
        };
        let upload = build_snapshot_upload(&state);
        assert_eq!(upload.location, "https://maps.google.com/?q=1,2");
        assert_eq!(upload.contact1, "a@example.com");
        assert_eq!(upload.contact2, "");

        assert_eq!(render_location(None, Some("2")), "N/A");
    }
}
