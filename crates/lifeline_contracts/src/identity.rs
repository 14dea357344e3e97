#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{validate_text_len, ContractViolation};

pub const DEVICE_ID_MIN_LEN: usize = 10;
pub const DEVICE_ID_MAX_LEN: usize = 100;
pub const PERSON_NAME_MAX_LEN: usize = 100;
pub const CONTACT_ADDRESS_MAX_LEN: usize = 100;

/// Stable server-side user identifier: lowercase hex SHA-256 of the device id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Result<Self, ContractViolation> {
        let value = value.into();
        if value.len() != 64 || !value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(ContractViolation::InvalidValue {
                field: "user_id",
                reason: "must be 64 lowercase hex characters",
            });
        }
        Ok(Self(value))
    }

    /// Infallible construction from a SHA-256 digest.
    pub fn from_sha256_bytes(bytes: [u8; 32]) -> Self {
        use std::fmt::Write as _;
        let mut hex = String::with_capacity(64);
        for b in bytes {
            let _ = write!(hex, "{b:02x}");
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Locally generated stable device identifier presented at login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(value: impl Into<String>) -> Result<Self, ContractViolation> {
        let value = value.into();
        validate_text_len("device_id", &value, DEVICE_ID_MIN_LEN, DEVICE_ID_MAX_LEN)?;
        if value.chars().any(|c| c.is_whitespace()) {
            return Err(ContractViolation::InvalidValue {
                field: "device_id",
                reason: "whitespace not allowed",
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Display name of the monitored person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName(String);

impl PersonName {
    pub fn new(value: impl Into<String>) -> Result<Self, ContractViolation> {
        let value = value.into().trim().to_string();
        validate_text_len("person_name", &value, 1, PERSON_NAME_MAX_LEN)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Emergency contact address (email or phone, free-form, bounded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactAddress(String);

impl ContactAddress {
    pub fn new(value: impl Into<String>) -> Result<Self, ContractViolation> {
        let value = value.into().trim().to_string();
        validate_text_len("contact_address", &value, 1, CONTACT_ADDRESS_MAX_LEN)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_identity_01_user_id_requires_sha256_hex_shape() {
        assert!(UserId::new("a".repeat(64)).is_ok());
        assert!(UserId::new("A".repeat(64)).is_err());
        assert!(UserId::new("a".repeat(63)).is_err());
    }

    #[test]
    fn at_identity_02_device_id_length_bounds() {
        assert!(DeviceId::new("abcdef0123").is_ok());
        assert!(DeviceId::new("short").is_err());
        assert!(DeviceId::new("x".repeat(101)).is_err());
        assert!(DeviceId::new("has space x").is_err());
    }

    #[test]
    fn at_identity_03_person_name_trimmed_and_bounded() {
        assert_eq!(PersonName::new("  Maria ").unwrap().as_str(), "Maria");
        assert!(PersonName::new("   ").is_err());
        assert!(PersonName::new("x".repeat(101)).is_err());
    }

    #[test]
    fn at_identity_04_contact_address_bounds() {
        assert!(ContactAddress::new("maria@example.com").is_ok());
        assert!(ContactAddress::new("").is_err());
        assert!(ContactAddress::new("c".repeat(101)).is_err());
    }
}
