#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use lifeline_contracts::EpochTimeMs;

pub const MAX_DEVICE_CONTACTS: usize = 3;

/// Device-side last-known signal state, one instance per installation.
/// Sensor callbacks, the location callback, the interaction collaborator and
/// the login flow all write here; the periodic evaluator only reads a
/// snapshot copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalSignalState {
    pub last_interaction_at: Option<EpochTimeMs>,
    pub last_movement_at: Option<EpochTimeMs>,
    pub last_latitude: Option<String>,
    pub last_longitude: Option<String>,
    pub user_name: String,
    pub contacts: Vec<String>,
    pub auth_token: Option<String>,
}

/// Shared handle over the cache. Critical sections are single field writes
/// or a snapshot clone, so callbacks never observe a half-written state.
#[derive(Debug, Clone, Default)]
pub struct SharedSignalCache {
    inner: Arc<Mutex<LocalSignalState>>,
}

impl SharedSignalCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LocalSignalState> {
        // The state is plain data; a panic mid-write cannot leave it in a
        // torn shape, so a poisoned lock is recoverable.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn record_interaction(&self, now: EpochTimeMs) {
        self.lock().last_interaction_at = Some(now);
    }

    pub fn record_movement(&self, now: EpochTimeMs) {
        self.lock().last_movement_at = Some(now);
    }

    pub fn record_location(&self, latitude: f64, longitude: f64) {
        let mut state = self.lock();
        state.last_latitude = Some(latitude.to_string());
        state.last_longitude = Some(longitude.to_string());
    }

    pub fn set_profile(&self, user_name: String, contacts: Vec<String>) {
        let mut state = self.lock();
        state.user_name = user_name;
        state.contacts = contacts;
        state.contacts.truncate(MAX_DEVICE_CONTACTS);
    }

    pub fn set_auth_token(&self, token: String) {
        self.lock().auth_token = Some(token);
    }

    pub fn snapshot(&self) -> LocalSignalState {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_cache_01_writes_visible_in_snapshot() {
        let cache = SharedSignalCache::new();
        cache.record_interaction(EpochTimeMs(100));
        cache.record_movement(EpochTimeMs(200));
        cache.record_location(-23.55, -46.63);
        cache.set_profile(
            "Maria".to_string(),
            vec!["a@example.com".to_string(), "b@example.com".to_string()],
        );
        cache.set_auth_token("tok".to_string());

        let snap = cache.snapshot();
        assert_eq!(snap.last_interaction_at, Some(EpochTimeMs(100)));
        assert_eq!(snap.last_movement_at, Some(EpochTimeMs(200)));
        assert_eq!(snap.last_latitude.as_deref(), Some("-23.55"));
        assert_eq!(snap.last_longitude.as_deref(), Some("-46.63"));
        assert_eq!(snap.user_name, "Maria");
        assert_eq!(snap.contacts.len(), 2);
        assert_eq!(snap.auth_token.as_deref(), Some("tok"));
    }

    #[test]
    fn at_cache_02_contact_list_capped_at_three() {
        let cache = SharedSignalCache::new();
        cache.set_profile(
            "Maria".to_string(),
            vec![
                "1".to_string(),
                "2".to_string(),
                "3".to_string(),
                "4".to_string(),
            ],
        );
        assert_eq!(cache.snapshot().contacts.len(), 3);
    }

    #[test]
    fn at_cache_03_concurrent_writers_and_reader() {
        let cache = SharedSignalCache::new();
        let writer = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for step in 0..500u64 {
                    cache.record_movement(EpochTimeMs(step));
                    cache.record_interaction(EpochTimeMs(step));
                }
            })
        };
        for _ in 0..500 {
            let snap = cache.snapshot();
            // both fields advance together; the reader never sees one far
            // ahead of the other beyond a single write
            if let (Some(movement), Some(interaction)) =
                (snap.last_movement_at, snap.last_interaction_at)
            {
                assert!(movement.0.abs_diff(interaction.0) <= 1);
            }
        }
        writer.join().unwrap();
    }
}
