#![forbid(unsafe_code)]

use std::sync::Arc;

use lifeline_contracts::record::{apply_patch, EmergencyRecord, RecordPatch};
use lifeline_contracts::{EpochTimeMs, UserId};
use lifeline_storage::{RecordRepo, StorageError};
use tracing::{info, warn};

use crate::alert_gate::should_alert;
use crate::detector::evaluate_emergency;
use crate::notifier::{AlertJob, DispatchMetrics, NotifierRuntime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    UnknownUser,
    Storage(StorageError),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownUser => write!(f, "no record for authenticated user"),
            Self::Storage(err) => write!(f, "storage failure: {err}"),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<StorageError> for IngestError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    NotEmergency,
    Deduplicated,
    Dispatched(DispatchMetrics),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub record: EmergencyRecord,
    pub decision: AlertDecision,
}

enum SlotVerdict {
    Unknown,
    Calm(EmergencyRecord),
    Deduplicated(EmergencyRecord),
    Alert(EmergencyRecord, AlertJob),
}

/// Accepted-submission pipeline: merge -> detect -> gate -> dispatch.
/// The merge, verdict, cooldown check and cooldown mark all run under the
/// user's slot lock; only the contact fan-out happens outside it.
pub struct IngestPipeline<R: RecordRepo> {
    store: Arc<R>,
    notifier: NotifierRuntime,
}

impl<R: RecordRepo> IngestPipeline<R> {
    pub fn new(store: Arc<R>, notifier: NotifierRuntime) -> Self {
        Self { store, notifier }
    }

    /// Merges one submission into the user's record and decides whether to
    /// fan out an alert. A valid token whose record was evicted yields
    /// `UnknownUser`; the caller recreates the record through login.
    pub fn submit(
        &self,
        user_id: &UserId,
        patch: &RecordPatch,
        now: EpochTimeMs,
    ) -> Result<IngestOutcome, IngestError> {
        let verdict = self.store.with_slot(user_id, |slot| {
            let Some(slot) = slot.as_mut() else {
                return SlotVerdict::Unknown;
            };
            let previous_report = slot.record.last_update;
            apply_patch(&mut slot.record, patch, now);

            // Staleness is judged over the report interval that just ended,
            // not against the bump this submission wrote.
            let mut assessed = slot.record.clone();
            assessed.last_update = previous_report;
            if !evaluate_emergency(&assessed, now) {
                return SlotVerdict::Calm(slot.record.clone());
            }
            if !should_alert(slot.last_alert_at, now) {
                return SlotVerdict::Deduplicated(slot.record.clone());
            }
            // test-and-set: the cooldown mark lands before the lock drops
            slot.last_alert_at = Some(now);
            let job = AlertJob {
                user_name: slot.record.user_name.clone(),
                location: slot.record.location.clone(),
                contacts: slot
                    .record
                    .active_contacts()
                    .into_iter()
                    .map(|c| c.as_str().to_string())
                    .collect(),
            };
            SlotVerdict::Alert(slot.record.clone(), job)
        })?;

        match verdict {
            SlotVerdict::Unknown => Err(IngestError::UnknownUser),
            SlotVerdict::Calm(record) => Ok(IngestOutcome {
                record,
                decision: AlertDecision::NotEmergency,
            }),
            SlotVerdict::Deduplicated(record) => {
                info!(user_id = %user_id.as_str(), "emergency verdict within alert cooldown");
                Ok(IngestOutcome {
                    record,
                    decision: AlertDecision::Deduplicated,
                })
            }
            SlotVerdict::Alert(record, job) => {
                warn!(
                    user_id = %user_id.as_str(),
                    user_name = %job.user_name,
                    "possible emergency detected"
                );
                let metrics = self.notifier.dispatch(&job);
                Ok(IngestOutcome {
                    record,
                    decision: AlertDecision::Dispatched(metrics),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_contracts::identity::{ContactAddress, PersonName};
    use lifeline_storage::ShardedRecordStore;

    const MINUTE_MS: u64 = 60_000;
    const HOUR_MS: u64 = 3_600_000;

    fn user(tag: u8) -> UserId {
        let mut id = format!("{:02x}", tag);
        id.push_str(&"0".repeat(64 - id.len()));
        UserId::new(id).unwrap()
    }

    fn registration_patch() -> RecordPatch {
        RecordPatch {
            user_name: Some(PersonName::new("Maria").unwrap()),
            contacts: [
                Some(ContactAddress::new("a@example.com").unwrap()),
                Some(ContactAddress::new("b@example.com").unwrap()),
                None,
            ],
            ..RecordPatch::default()
        }
    }

    fn negative_signals_patch() -> RecordPatch {
        RecordPatch {
            interaction: Some(false),
            movement: Some(false),
            location: Some("https://maps.google.com/?q=1,2".to_string()),
            charging: Some(false),
            sleep_time: Some(false),
            ..RecordPatch::default()
        }
    }

    fn pipeline_with_recording(
        store: Arc<ShardedRecordStore>,
    ) -> (
        IngestPipeline<ShardedRecordStore>,
        Arc<std::sync::Mutex<Vec<crate::notifier::RecordedDelivery>>>,
    ) {
        let (notifier, deliveries) = NotifierRuntime::recording();
        (IngestPipeline::new(store, notifier), deliveries)
    }

    #[test]
    fn at_pipeline_01_unknown_user_is_rejected() {
        let store = Arc::new(ShardedRecordStore::new_in_memory());
        let (pipeline, _) = pipeline_with_recording(Arc::clone(&store));
        let out = pipeline.submit(&user(1), &RecordPatch::empty(), EpochTimeMs(1_000));
        assert_eq!(out, Err(IngestError::UnknownUser));
    }

    #[test]
    fn at_pipeline_02_fresh_submission_is_calm() {
        let store = Arc::new(ShardedRecordStore::new_in_memory());
        let (pipeline, deliveries) = pipeline_with_recording(Arc::clone(&store));
        let u = user(2);
        store.upsert(&u, &registration_patch(), EpochTimeMs(0)).unwrap();

        let out = pipeline
            .submit(&u, &negative_signals_patch(), EpochTimeMs(30 * MINUTE_MS))
            .unwrap();
        assert_eq!(out.decision, AlertDecision::NotEmergency);
        assert!(deliveries.lock().unwrap().is_empty());
    }

    #[test]
    fn at_pipeline_03_end_to_end_hourly_submissions() {
        let store = Arc::new(ShardedRecordStore::new_in_memory());
        let (pipeline, deliveries) = pipeline_with_recording(Arc::clone(&store));
        let u = user(3);

        // registration at t0, then hourly negative reports
        let t0 = EpochTimeMs(0);
        store.upsert(&u, &registration_patch(), t0).unwrap();

        let step_ms = HOUR_MS + MINUTE_MS;
        let mut decisions = Vec::new();
        for step in 1..=5u64 {
            let at = t0.plus_ms(step * step_ms);
            let out = pipeline.submit(&u, &negative_signals_patch(), at).unwrap();
            decisions.push(out.decision);
        }

        // the first report past the one-hour movement threshold alerts; the
        // later ones re-qualify and re-alert only past the 30 min cooldown
        for decision in &decisions {
            assert!(matches!(
                decision,
                AlertDecision::Dispatched(_) | AlertDecision::NotEmergency
            ));
        }
        assert!(matches!(decisions[0], AlertDecision::Dispatched(_)));

        let deliveries = deliveries.lock().unwrap();
        // two contacts per dispatched alert
        assert_eq!(deliveries.len() % 2, 0);
        assert!(deliveries
            .iter()
            .all(|d| d.body.contains("https://maps.google.com/?q=1,2")));
    }

    #[test]
    fn at_pipeline_04_cooldown_dedupes_rapid_verdicts() {
        let store = Arc::new(ShardedRecordStore::new_in_memory());
        let (pipeline, deliveries) = pipeline_with_recording(Arc::clone(&store));
        let u = user(4);
        let t0 = EpochTimeMs(0);
        store.upsert(&u, &registration_patch(), t0).unwrap();

        // silent for two hours, then two reports ten minutes apart, both
        // arriving after another long gap so both qualify as emergencies
        let first = pipeline
            .submit(&u, &negative_signals_patch(), t0.plus_ms(2 * HOUR_MS))
            .unwrap();
        assert!(matches!(first.decision, AlertDecision::Dispatched(_)));

        // wind the record back so the second verdict also sees a stale gap
        store
            .with_slot(&u, |slot| {
                if let Some(slot) = slot.as_mut() {
                    slot.record.last_update = t0;
                }
            })
            .unwrap();
        let second = pipeline
            .submit(
                &u,
                &negative_signals_patch(),
                t0.plus_ms(2 * HOUR_MS + 10 * MINUTE_MS),
            )
            .unwrap();
        assert_eq!(second.decision, AlertDecision::Deduplicated);

        // a third qualifying verdict 31 minutes after the first dispatch passes
        store
            .with_slot(&u, |slot| {
                if let Some(slot) = slot.as_mut() {
                    slot.record.last_update = t0;
                }
            })
            .unwrap();
        let third = pipeline
            .submit(
                &u,
                &negative_signals_patch(),
                t0.plus_ms(2 * HOUR_MS + 31 * MINUTE_MS),
            )
            .unwrap();
        assert!(matches!(third.decision, AlertDecision::Dispatched(_)));

        assert_eq!(deliveries.lock().unwrap().len(), 4); // 2 alerts x 2 contacts
    }

    #[test]
    fn at_pipeline_05_delivery_failures_do_not_fail_submission() {
        let store = Arc::new(ShardedRecordStore::new_in_memory());
        let pipeline = IngestPipeline::new(
            Arc::clone(&store),
            NotifierRuntime::AlwaysFail {
                message: "relay down".to_string(),
            },
        );
        let u = user(5);
        let t0 = EpochTimeMs(0);
        store.upsert(&u, &registration_patch(), t0).unwrap();

        let out = pipeline
            .submit(&u, &negative_signals_patch(), t0.plus_ms(3 * HOUR_MS))
            .unwrap();
        match out.decision {
            AlertDecision::Dispatched(metrics) => {
                assert_eq!(metrics.attempted, 2);
                assert_eq!(metrics.failed, 2);
                assert_eq!(metrics.delivered, 0);
            }
            other => panic!("expected dispatched decision, got {other:?}"),
        }
    }

    #[test]
    fn at_pipeline_06_positive_flags_keep_record_calm_across_gaps() {
        let store = Arc::new(ShardedRecordStore::new_in_memory());
        let (pipeline, deliveries) = pipeline_with_recording(Arc::clone(&store));
        let u = user(6);
        let t0 = EpochTimeMs(0);
        store.upsert(&u, &registration_patch(), t0).unwrap();

        let patch = RecordPatch {
            interaction: Some(true),
            movement: Some(true),
            charging: Some(true),
            ..RecordPatch::default()
        };
        let out = pipeline.submit(&u, &patch, t0.plus_ms(6 * HOUR_MS)).unwrap();
        assert_eq!(out.decision, AlertDecision::NotEmergency);
        assert!(deliveries.lock().unwrap().is_empty());
    }
}
