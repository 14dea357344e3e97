#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{validate_text_len, ContractViolation, Validate};
use crate::identity::{ContactAddress, PersonName};
use crate::record::{RecordPatch, LOCATION_TEXT_MAX_LEN, MAX_CONTACTS};

pub const LOGIN_USER_NAME_MAX_LEN: usize = 50;

/// `"S"`/`"N"` flag used by the full-form submission fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalFlag {
    #[serde(rename = "S")]
    Yes,
    #[serde(rename = "N")]
    No,
}

impl SignalFlag {
    pub fn as_bool(self) -> bool {
        matches!(self, SignalFlag::Yes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "userName")]
    pub user_name: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text_len("login_request.device_id", &self.device_id, 10, 100)?;
        validate_text_len(
            "login_request.user_name",
            self.user_name.trim(),
            1,
            LOGIN_USER_NAME_MAX_LEN,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginOk {
    pub success: bool,
    pub token: String,
    pub message: String,
}

/// Submission body. Accepts the full-form signal fields and the simplified
/// device form in one shape; every field is optional and merges
/// independently. `localizacao` wins over `location` when both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interacao: Option<SignalFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movimento: Option<SignalFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localizacao: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conectado: Option<SignalFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub em_horario_de_sono: Option<SignalFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact3: Option<String>,
}

impl IngestRequest {
    /// Validates field bounds and lowers the wire shape into a
    /// [`RecordPatch`]. Blank contact and name fields are treated as absent
    /// rather than as clears, so a sparse sender never wipes prior values.
    pub fn into_patch(self) -> Result<RecordPatch, ContractViolation> {
        let user_name = match self.user_name {
            Some(name) if !name.trim().is_empty() => Some(PersonName::new(name)?),
            _ => None,
        };

        let location = match [self.localizacao, self.location]
            .into_iter()
            .flatten()
            .find(|text| !text.is_empty())
        {
            Some(text) => {
                validate_text_len("ingest_request.location", &text, 1, LOCATION_TEXT_MAX_LEN)?;
                Some(text)
            }
            None => None,
        };

        let mut contacts: [Option<ContactAddress>; MAX_CONTACTS] = [None, None, None];
        for (slot, raw) in contacts
            .iter_mut()
            .zip([self.contact1, self.contact2, self.contact3])
        {
            if let Some(value) = raw {
                if !value.trim().is_empty() {
                    *slot = Some(ContactAddress::new(value)?);
                }
            }
        }

        Ok(RecordPatch {
            user_name,
            contacts,
            interaction: self.interacao.map(SignalFlag::as_bool),
            movement: self.movimento.map(SignalFlag::as_bool),
            location,
            charging: self.conectado.map(SignalFlag::as_bool),
            sleep_time: self.em_horario_de_sono.map(SignalFlag::as_bool),
        })
    }
}

/// Simplified payload the device evaluator uploads: profile and best-known
/// location only. The server merges it through the same submission route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotUpload {
    pub user_name: String,
    pub contact1: String,
    pub contact2: String,
    pub contact3: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

impl ApiMessage {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub users: u64,
    pub timestamp: u64,
    pub version: String,
}
