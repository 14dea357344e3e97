#![forbid(unsafe_code)]

use std::env;
use std::time::Duration;

use lifeline_contracts::wire::{LoginOk, LoginRequest, SnapshotUpload};

pub const UPLINK_CONNECT_TIMEOUT_MS_DEFAULT: u64 = 3_000;
pub const UPLINK_REQUEST_TIMEOUT_MS_DEFAULT: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UplinkError {
    Encode(String),
    Status(u16),
    Transport(String),
    Protocol(String),
}

impl std::fmt::Display for UplinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(reason) => write!(f, "payload encode failed: {reason}"),
            Self::Status(code) => write!(f, "server answered http status {code}"),
            Self::Transport(reason) => write!(f, "transport error: {reason}"),
            Self::Protocol(reason) => write!(f, "protocol error: {reason}"),
        }
    }
}

impl std::error::Error for UplinkError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkHttpConfig {
    pub endpoint: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl UplinkHttpConfig {
    pub fn from_env() -> Option<Self> {
        let endpoint = env::var("LIFELINE_UPLINK_ENDPOINT").ok()?;
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return None;
        }
        let connect_timeout_ms = env::var("LIFELINE_UPLINK_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (100..=60_000).contains(v))
            .unwrap_or(UPLINK_CONNECT_TIMEOUT_MS_DEFAULT);
        let request_timeout_ms = env::var("LIFELINE_UPLINK_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (100..=120_000).contains(v))
            .unwrap_or(UPLINK_REQUEST_TIMEOUT_MS_DEFAULT);
        Some(Self {
            endpoint,
            connect_timeout_ms,
            request_timeout_ms,
        })
    }
}

/// Device-to-server transport. Callers treat `submit` failures as
/// fire-and-forget: the evaluator logs them and waits for its next tick,
/// never retrying in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UplinkRuntime {
    Loopback,
    Http(UplinkHttpConfig),
    AlwaysFail { message: String },
}

impl Default for UplinkRuntime {
    fn default() -> Self {
        Self::from_env_or_loopback()
    }
}

impl UplinkRuntime {
    pub fn from_env_or_loopback() -> Self {
        if let Some(config) = UplinkHttpConfig::from_env() {
            return Self::Http(config);
        }
        Self::Loopback
    }

    #[cfg(test)]
    pub fn always_fail_for_tests(message: &str) -> Self {
        Self::AlwaysFail {
            message: message.to_string(),
        }
    }

    pub fn login(&self, device_id: &str, user_name: &str) -> Result<String, UplinkError> {
        match self {
            Self::Loopback => Ok(format!("loopback_token:{device_id}")),
            Self::AlwaysFail { message } => Err(UplinkError::Transport(message.clone())),
            Self::Http(config) => http_login(config, device_id, user_name),
        }
    }

    pub fn submit(&self, token: &str, upload: &SnapshotUpload) -> Result<(), UplinkError> {
        match self {
            Self::Loopback => Ok(()),
            Self::AlwaysFail { message } => Err(UplinkError::Transport(message.clone())),
            Self::Http(config) => http_submit(config, token, upload),
        }
    }
}

fn build_agent(config: &UplinkHttpConfig) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
        .timeout_read(Duration::from_millis(config.request_timeout_ms))
        .timeout_write(Duration::from_millis(config.request_timeout_ms))
        .build()
}

fn http_login(
    config: &UplinkHttpConfig,
    device_id: &str,
    user_name: &str,
) -> Result<String, UplinkError> {
    let payload = serde_json::to_string(&LoginRequest {
        device_id: device_id.to_string(),
        user_name: user_name.to_string(),
    })
    .map_err(|err| UplinkError::Encode(err.to_string()))?;

    let url = format!("{}/api/auth/login", config.endpoint);
    let response = build_agent(config)
        .post(&url)
        .set("content-type", "application/json")
        .send_string(&payload);
    let body = match response {
        Ok(resp) => resp
            .into_string()
            .map_err(|err| UplinkError::Transport(err.to_string()))?,
        Err(ureq::Error::Status(code, _)) => return Err(UplinkError::Status(code)),
        Err(ureq::Error::Transport(err)) => {
            return Err(UplinkError::Transport(err.to_string()))
        }
    };
    let login: LoginOk =
        serde_json::from_str(&body).map_err(|err| UplinkError::Protocol(err.to_string()))?;
    if login.token.is_empty() {
        return Err(UplinkError::Protocol("login response carried no token".to_string()));
    }
    Ok(login.token)
}

fn http_submit(
    config: &UplinkHttpConfig,
    token: &str,
    upload: &SnapshotUpload,
) -> Result<(), UplinkError> {
    let payload =
        serde_json::to_string(upload).map_err(|err| UplinkError::Encode(err.to_string()))?;

    let url = format!("{}/api/receber-dados", config.endpoint);
    let response = build_agent(config)
        .post(&url)
        .set("content-type", "application/json")
        .set("authorization", &format!("Bearer {token}"))
        .send_string(&payload);
    match response {
        Ok(_) => Ok(()),
        Err(ureq::Error::Status(code, _)) => Err(UplinkError::Status(code)),
        Err(ureq::Error::Transport(err)) => Err(UplinkError::Transport(err.to_string())),
    }
}
