#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::EpochTimeMs;
use crate::identity::{ContactAddress, PersonName};

pub const MAX_CONTACTS: usize = 3;
pub const LOCATION_TEXT_MAX_LEN: usize = 500;

/// Server-side per-user state. One record per authenticated user; created at
/// login, merged on every accepted submission, evicted after prolonged
/// inactivity.
///
/// Invariant: `last_update >= created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyRecord {
    pub user_name: String,
    pub contacts: [Option<ContactAddress>; MAX_CONTACTS],
    pub last_update: EpochTimeMs,
    pub last_interaction: bool,
    pub last_movement: bool,
    pub location: String,
    pub is_charging: bool,
    pub is_sleep_time: bool,
    pub created_at: EpochTimeMs,
}

impl EmergencyRecord {
    pub fn v1(user_name: String, now: EpochTimeMs) -> Self {
        Self {
            user_name,
            contacts: [None, None, None],
            last_update: now,
            last_interaction: false,
            last_movement: false,
            location: String::new(),
            is_charging: false,
            is_sleep_time: false,
            created_at: now,
        }
    }

    /// Configured contacts in slot order, skipping empty slots.
    pub fn active_contacts(&self) -> Vec<&ContactAddress> {
        self.contacts.iter().flatten().collect()
    }
}

/// Partial update carried by one submission. Every field is optional; the
/// merge rule is "present overwrites, absent preserves" (see [`apply_patch`]).
/// Contact slots merge independently.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordPatch {
    pub user_name: Option<PersonName>,
    pub contacts: [Option<ContactAddress>; MAX_CONTACTS],
    pub interaction: Option<bool>,
    pub movement: Option<bool>,
    pub location: Option<String>,
    pub charging: Option<bool>,
    pub sleep_time: Option<bool>,
}

impl RecordPatch {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Merges one submission into the record: present fields overwrite, absent
/// fields preserve the prior value, and `last_update` is always bumped (an
/// empty patch is a liveness signal by itself).
pub fn apply_patch(record: &mut EmergencyRecord, patch: &RecordPatch, now: EpochTimeMs) {
    if let Some(user_name) = patch.user_name.as_ref() {
        record.user_name = user_name.as_str().to_string();
    }
    for (slot, incoming) in record.contacts.iter_mut().zip(patch.contacts.iter()) {
        if let Some(contact) = incoming.as_ref() {
            *slot = Some(contact.clone());
        }
    }
    if let Some(interaction) = patch.interaction {
        record.last_interaction = interaction;
    }
    if let Some(movement) = patch.movement {
        record.last_movement = movement;
    }
    if let Some(location) = patch.location.as_ref() {
        record.location = location.clone();
    }
    if let Some(charging) = patch.charging {
        record.is_charging = charging;
    }
    if let Some(sleep_time) = patch.sleep_time {
        record.is_sleep_time = sleep_time;
    }
    // last_update never regresses below created_at
    record.last_update = EpochTimeMs(now.0.max(record.created_at.0));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(s: &str) -> ContactAddress {
        ContactAddress::new(s).unwrap()
    }

    #[test]
    fn at_record_01_empty_patch_bumps_last_update_only() {
        let mut record = EmergencyRecord::v1("Maria".to_string(), EpochTimeMs(1_000));
        record.location = "somewhere".to_string();
        record.last_interaction = true;
        let before = record.clone();

        apply_patch(&mut record, &RecordPatch::empty(), EpochTimeMs(9_000));

        assert_eq!(record.last_update, EpochTimeMs(9_000));
        assert_eq!(record.user_name, before.user_name);
        assert_eq!(record.contacts, before.contacts);
        assert_eq!(record.last_interaction, before.last_interaction);
        assert_eq!(record.last_movement, before.last_movement);
        assert_eq!(record.location, before.location);
        assert_eq!(record.is_charging, before.is_charging);
        assert_eq!(record.is_sleep_time, before.is_sleep_time);
        assert_eq!(record.created_at, before.created_at);
    }

    #[test]
    fn at_record_02_present_fields_overwrite_absent_preserve() {
        let mut record = EmergencyRecord::v1("Maria".to_string(), EpochTimeMs(1_000));
        record.contacts[0] = Some(contact("first@example.com"));
        record.location = "https://maps.google.com/?q=1,2".to_string();

        let patch = RecordPatch {
            contacts: [None, Some(contact("second@example.com")), None],
            movement: Some(true),
            sleep_time: Some(true),
            ..RecordPatch::default()
        };
        apply_patch(&mut record, &patch, EpochTimeMs(2_000));

        assert_eq!(record.contacts[0], Some(contact("first@example.com")));
        assert_eq!(record.contacts[1], Some(contact("second@example.com")));
        assert!(record.last_movement);
        assert!(record.is_sleep_time);
        // absent fields kept
        assert_eq!(record.location, "https://maps.google.com/?q=1,2");
        assert!(!record.last_interaction);
    }

    #[test]
    fn at_record_03_last_update_never_precedes_created_at() {
        let mut record = EmergencyRecord::v1("Maria".to_string(), EpochTimeMs(5_000));
        apply_patch(&mut record, &RecordPatch::empty(), EpochTimeMs(3_000));
        assert_eq!(record.last_update, EpochTimeMs(5_000));
    }

    #[test]
    fn at_record_04_active_contacts_skip_empty_slots() {
        let mut record = EmergencyRecord::v1("Maria".to_string(), EpochTimeMs(1));
        record.contacts[1] = Some(contact("only@example.com"));
        let active = record.active_contacts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].as_str(), "only@example.com");
    }
}
