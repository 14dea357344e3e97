#![forbid(unsafe_code)]

use lifeline_contracts::EpochTimeMs;
use lifeline_storage::{RecordRepo, SessionStore, StorageError};
use tracing::info;

/// Records idle longer than this are evicted by the sweep.
pub const RETENTION_MAX_IDLE_MS: u64 = 24 * 3_600_000;
pub const SWEEP_INTERVAL_MS_DEFAULT: u64 = 24 * 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionSweepMetrics {
    pub examined: u32,
    pub evicted: u32,
    pub sessions_revoked: u32,
}

/// One sweep pass: drops every record whose `last_update` is older than the
/// retention window, together with its cooldown mark and live session.
/// Eviction is not reversible; a returning device re-authenticates and
/// re-submits full data.
pub fn run_retention_sweep_pass<R: RecordRepo>(
    store: &R,
    sessions: &SessionStore,
    now: EpochTimeMs,
) -> Result<RetentionSweepMetrics, StorageError> {
    let examined = store.user_count()? as u32;
    let cutoff = now.minus_ms(RETENTION_MAX_IDLE_MS);
    let evicted = store.evict_older_than(cutoff)?;

    let mut sessions_revoked = 0;
    for user_id in &evicted {
        if sessions.revoke_user(user_id)? {
            sessions_revoked += 1;
        }
        info!(user_id = %user_id.as_str(), "record evicted for inactivity");
    }

    Ok(RetentionSweepMetrics {
        examined,
        evicted: evicted.len() as u32,
        sessions_revoked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_contracts::record::RecordPatch;
    use lifeline_contracts::UserId;
    use lifeline_storage::ShardedRecordStore;

    const HOUR_MS: u64 = 3_600_000;

    fn user(tag: u8) -> UserId {
        let mut id = format!("{:02x}", tag);
        id.push_str(&"0".repeat(64 - id.len()));
        UserId::new(id).unwrap()
    }

    #[test]
    fn at_retention_01_sweep_evicts_only_past_window() {
        let store = ShardedRecordStore::new_in_memory();
        let sessions = SessionStore::new_in_memory();
        let sweep_at = EpochTimeMs(40 * HOUR_MS);

        let stale = user(1);
        let fresh = user(2);
        store
            .upsert(&stale, &RecordPatch::empty(), sweep_at.minus_ms(25 * HOUR_MS))
            .unwrap();
        store
            .upsert(&fresh, &RecordPatch::empty(), sweep_at.minus_ms(23 * HOUR_MS))
            .unwrap();
        sessions
            .issue(&stale, "tok_stale".to_string(), sweep_at.minus_ms(25 * HOUR_MS), 48 * HOUR_MS)
            .unwrap();

        let metrics = run_retention_sweep_pass(&store, &sessions, sweep_at).unwrap();
        assert_eq!(metrics.examined, 2);
        assert_eq!(metrics.evicted, 1);
        assert_eq!(metrics.sessions_revoked, 1);

        assert!(store.get(&stale).unwrap().is_none());
        assert!(store.get(&fresh).unwrap().is_some());
        // the evicted user's still-unexpired token no longer authenticates
        assert_eq!(
            sessions
                .authenticate("tok_stale", sweep_at)
                .unwrap(),
            lifeline_storage::AuthDecision::Unknown
        );
    }

    #[test]
    fn at_retention_02_sweep_on_empty_store_is_a_no_op() {
        let store = ShardedRecordStore::new_in_memory();
        let sessions = SessionStore::new_in_memory();
        let metrics =
            run_retention_sweep_pass(&store, &sessions, EpochTimeMs(100 * HOUR_MS)).unwrap();
        assert_eq!(metrics, RetentionSweepMetrics::default());
    }
}
