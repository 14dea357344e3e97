#![forbid(unsafe_code)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use lifeline_contracts::{DeviceId, UserId};

pub const SESSION_TOKEN_BYTES: usize = 32;

/// Stable hashed user identifier for a device: lowercase hex SHA-256 of the
/// presented device id. The raw device id is never used as a storage key.
pub fn derive_user_id(device_id: &DeviceId) -> UserId {
    let digest: [u8; 32] = Sha256::digest(device_id.as_str().as_bytes()).into();
    UserId::from_sha256_bytes(digest)
}

/// Opaque bearer token: 32 random bytes, URL-safe base64 without padding.
pub fn mint_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
