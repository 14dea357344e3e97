#![forbid(unsafe_code)]

pub mod common;
pub mod identity;
pub mod record;
pub mod wire;

pub use common::{ContractViolation, EpochTimeMs, MinuteOfDay, Validate};
pub use identity::{ContactAddress, DeviceId, PersonName, UserId};
pub use record::{apply_patch, EmergencyRecord, RecordPatch, MAX_CONTACTS};
