#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use lifeline_contracts::record::{apply_patch, EmergencyRecord, RecordPatch};
use lifeline_contracts::{EpochTimeMs, UserId};

const SHARD_COUNT: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    LockPoisoned,
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LockPoisoned => write!(f, "record store lock poisoned"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Everything the server keeps for one user, guarded by a single shard lock:
/// the record itself plus the alert-cooldown mark, so the
/// merge -> detect -> gate -> mark sequence is atomic per user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSlot {
    pub record: EmergencyRecord,
    pub last_alert_at: Option<EpochTimeMs>,
}

impl UserSlot {
    pub fn new(record: EmergencyRecord) -> Self {
        Self {
            record,
            last_alert_at: None,
        }
    }
}

/// Per-user state store. The backing is swappable; the reference backing is
/// memory-resident and lost on restart.
pub trait RecordRepo {
    /// Runs `f` with exclusive access to the user's slot (`None` when the
    /// user has no record). Holders must keep the critical section short;
    /// dispatch I/O belongs outside.
    fn with_slot<T>(
        &self,
        user_id: &UserId,
        f: impl FnOnce(&mut Option<UserSlot>) -> T,
    ) -> Result<T, StorageError>;

    fn get(&self, user_id: &UserId) -> Result<Option<EmergencyRecord>, StorageError>;

    /// Removes every record with `last_update < cutoff`, dropping the
    /// cooldown mark together with it. Returns the evicted user ids.
    fn evict_older_than(&self, cutoff: EpochTimeMs) -> Result<Vec<UserId>, StorageError>;

    fn user_count(&self) -> Result<usize, StorageError>;

    /// Creates the record on first call, otherwise merges the present patch
    /// fields; `last_update` is bumped either way.
    fn upsert(
        &self,
        user_id: &UserId,
        patch: &RecordPatch,
        now: EpochTimeMs,
    ) -> Result<EmergencyRecord, StorageError> {
        self.with_slot(user_id, |slot| {
            let slot = slot.get_or_insert_with(|| {
                UserSlot::new(EmergencyRecord::v1(String::new(), now))
            });
            apply_patch(&mut slot.record, patch, now);
            slot.record.clone()
        })
    }
}

/// Fixed-fan-out sharded map with one mutex per shard: concurrent operations
/// on different users land on different shards and do not contend, while
/// update and eviction for the same user serialize on the same lock.
pub struct ShardedRecordStore {
    shards: Vec<Mutex<HashMap<UserId, UserSlot>>>,
}

impl Default for ShardedRecordStore {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl ShardedRecordStore {
    pub fn new_in_memory() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard_for(&self, user_id: &UserId) -> &Mutex<HashMap<UserId, UserSlot>> {
        let index = (fnv1a64(user_id.as_str().as_bytes()) % SHARD_COUNT as u64) as usize;
        &self.shards[index]
    }
}

impl RecordRepo for ShardedRecordStore {
    fn with_slot<T>(
        &self,
        user_id: &UserId,
        f: impl FnOnce(&mut Option<UserSlot>) -> T,
    ) -> Result<T, StorageError> {
        let mut shard = self
            .shard_for(user_id)
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut slot = shard.remove(user_id);
        let out = f(&mut slot);
        if let Some(updated) = slot {
            shard.insert(user_id.clone(), updated);
        }
        Ok(out)
    }

    fn get(&self, user_id: &UserId) -> Result<Option<EmergencyRecord>, StorageError> {
        let shard = self
            .shard_for(user_id)
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(shard.get(user_id).map(|slot| slot.record.clone()))
    }

    fn evict_older_than(&self, cutoff: EpochTimeMs) -> Result<Vec<UserId>, StorageError> {
        let mut evicted = Vec::new();
        for shard in &self.shards {
            let mut shard = shard.lock().map_err(|_| StorageError::LockPoisoned)?;
            shard.retain(|user_id, slot| {
                if slot.record.last_update < cutoff {
                    evicted.push(user_id.clone());
                    false
                } else {
                    true
                }
            });
        }
        Ok(evicted)
    }

    fn user_count(&self) -> Result<usize, StorageError> {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.lock().map_err(|_| StorageError::LockPoisoned)?.len();
        }
        Ok(total)
    }
}

// FNV-1a 64-bit, stable across platforms and processes.
fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut h = OFFSET;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(PRIME);
    }
    h
}
