#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use lifeline_contracts::{EpochTimeMs, UserId};

use crate::record_store::StorageError;

pub const SESSION_TTL_MS_DEFAULT: u64 = 24 * 3_600_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_id: UserId,
    pub token: String,
    pub issued_at: EpochTimeMs,
    pub expires_at: EpochTimeMs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Accepted(UserId),
    Expired,
    Unknown,
}

/// Bearer-session store. The server holds exactly one live token per user:
/// a new login supersedes the prior token (last-login-wins), and logout or
/// record eviction revokes it.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<SessionMaps>,
}

#[derive(Default)]
struct SessionMaps {
    by_token: HashMap<String, SessionRecord>,
    by_user: HashMap<UserId, String>,
}

impl SessionStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    pub fn issue(
        &self,
        user_id: &UserId,
        token: String,
        now: EpochTimeMs,
        ttl_ms: u64,
    ) -> Result<SessionRecord, StorageError> {
        let mut maps = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(prior) = maps.by_user.remove(user_id) {
            maps.by_token.remove(&prior);
        }
        let record = SessionRecord {
            user_id: user_id.clone(),
            token: token.clone(),
            issued_at: now,
            expires_at: now.plus_ms(ttl_ms),
        };
        maps.by_user.insert(user_id.clone(), token.clone());
        maps.by_token.insert(token, record.clone());
        Ok(record)
    }

    /// Resolves a presented bearer token. Expired sessions are dropped on
    /// the spot.
    pub fn authenticate(
        &self,
        token: &str,
        now: EpochTimeMs,
    ) -> Result<AuthDecision, StorageError> {
        let mut maps = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        let Some(record) = maps.by_token.get(token) else {
            return Ok(AuthDecision::Unknown);
        };
        if now >= record.expires_at {
            let user_id = record.user_id.clone();
            maps.by_token.remove(token);
            if maps.by_user.get(&user_id).map(String::as_str) == Some(token) {
                maps.by_user.remove(&user_id);
            }
            return Ok(AuthDecision::Expired);
        }
        Ok(AuthDecision::Accepted(record.user_id.clone()))
    }

    /// Drops the user's live session, if any. Returns whether one existed.
    pub fn revoke_user(&self, user_id: &UserId) -> Result<bool, StorageError> {
        let mut maps = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        match maps.by_user.remove(user_id) {
            Some(token) => {
                maps.by_token.remove(&token);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn session_count(&self) -> Result<usize, StorageError> {
        let maps = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(maps.by_token.len())
    }
}
