#![forbid(unsafe_code)]

pub mod record_store;
pub mod session;

pub use record_store::{RecordRepo, ShardedRecordStore, StorageError, UserSlot};
pub use session::{AuthDecision, SessionRecord, SessionStore};
