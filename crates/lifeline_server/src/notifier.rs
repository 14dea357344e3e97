#![forbid(unsafe_code)]

use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

pub const NOTIFY_CONNECT_TIMEOUT_MS_DEFAULT: u64 = 3_000;
pub const NOTIFY_REQUEST_TIMEOUT_MS_DEFAULT: u64 = 10_000;

/// One alert to fan out: the monitored person, their best-known location
/// string (passed through unchanged) and the configured contacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertJob {
    pub user_name: String,
    pub location: String,
    pub contacts: Vec<String>,
}

impl AlertJob {
    pub fn subject(&self) -> String {
        "EMERGENCY ALERT - Lifeline".to_string()
    }

    pub fn message_body(&self) -> String {
        let location = if self.location.is_empty() {
            "N/A"
        } else {
            self.location.as_str()
        };
        format!(
            "EMERGENCY ALERT\n\n\
             Name: {name}\n\
             Location: {location}\n\n\
             Please try to reach {name} immediately.\n\n\
             Automated alert from the Lifeline monitor.",
            name = self.user_name,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchMetrics {
    pub attempted: u16,
    pub delivered: u16,
    pub failed: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierWebhookConfig {
    pub endpoint: String,
    pub bearer_token: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl NotifierWebhookConfig {
    pub fn from_env() -> Option<Self> {
        let endpoint = env::var("LIFELINE_NOTIFY_ENDPOINT").ok()?;
        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }
        let bearer_token = env::var("LIFELINE_NOTIFY_BEARER").ok().and_then(|v| {
            let s = v.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        });
        let connect_timeout_ms = env::var("LIFELINE_NOTIFY_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (100..=60_000).contains(v))
            .unwrap_or(NOTIFY_CONNECT_TIMEOUT_MS_DEFAULT);
        let request_timeout_ms = env::var("LIFELINE_NOTIFY_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (100..=120_000).contains(v))
            .unwrap_or(NOTIFY_REQUEST_TIMEOUT_MS_DEFAULT);
        Some(Self {
            endpoint,
            bearer_token,
            connect_timeout_ms,
            request_timeout_ms,
        })
    }
}

/// A delivery observed by the recording notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDelivery {
    pub contact: String,
    pub body: String,
}

/// Delivery capability for emergency alerts. The real transport (email/SMS
/// relay) sits behind the webhook; `Loopback` acks without I/O and
/// `Recording`/`AlwaysFail` exist for tests.
#[derive(Debug, Clone)]
pub enum NotifierRuntime {
    Loopback,
    Webhook(NotifierWebhookConfig),
    Recording(Arc<Mutex<Vec<RecordedDelivery>>>),
    AlwaysFail { message: String },
}

impl Default for NotifierRuntime {
    fn default() -> Self {
        Self::from_env_or_loopback()
    }
}

impl NotifierRuntime {
    pub fn from_env_or_loopback() -> Self {
        if let Some(config) = NotifierWebhookConfig::from_env() {
            return Self::Webhook(config);
        }
        Self::Loopback
    }

    pub fn recording() -> (Self, Arc<Mutex<Vec<RecordedDelivery>>>) {
        let deliveries = Arc::new(Mutex::new(Vec::new()));
        (Self::Recording(Arc::clone(&deliveries)), deliveries)
    }

    /// Fans the alert out to every configured contact. Delivery is
    /// fire-and-forget per contact: a failure is logged and never blocks or
    /// fails the siblings, and the metrics are the only trace the caller
    /// sees.
    pub fn dispatch(&self, job: &AlertJob) -> DispatchMetrics {
        let mut metrics = DispatchMetrics::default();
        if job.contacts.is_empty() {
            warn!(user_name = %job.user_name, "emergency alert with no configured contacts");
            return metrics;
        }
        let body = job.message_body();
        for contact in &job.contacts {
            metrics.attempted += 1;
            match self.send_one(contact, &job.subject(), &body) {
                Ok(()) => {
                    info!(contact = %contact, user_name = %job.user_name, "alert delivered");
                    metrics.delivered += 1;
                }
                Err(reason) => {
                    warn!(
                        contact = %contact,
                        user_name = %job.user_name,
                        %reason,
                        "alert delivery failed"
                    );
                    metrics.failed += 1;
                }
            }
        }
        metrics
    }

    fn send_one(&self, contact: &str, subject: &str, body: &str) -> Result<(), String> {
        match self {
            Self::Loopback => Ok(()),
            Self::AlwaysFail { message } => Err(message.clone()),
            Self::Recording(deliveries) => {
                let mut deliveries = deliveries
                    .lock()
                    .map_err(|_| "recording notifier lock poisoned".to_string())?;
                deliveries.push(RecordedDelivery {
                    contact: contact.to_string(),
                    body: body.to_string(),
                });
                Ok(())
            }
            Self::Webhook(config) => send_webhook(config, contact, subject, body),
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

fn send_webhook(
    config: &NotifierWebhookConfig,
    contact: &str,
    subject: &str,
    body: &str,
) -> Result<(), String> {
    let payload = serde_json::to_string(&WebhookPayload {
        to: contact,
        subject,
        body,
    })
    .map_err(|err| format!("notify payload encode failed: {err}"))?;

    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
        .timeout_read(Duration::from_millis(config.request_timeout_ms))
        .timeout_write(Duration::from_millis(config.request_timeout_ms))
        .build();
    let mut request = agent
        .post(&config.endpoint)
        .set("content-type", "application/json");
    if let Some(token) = config.bearer_token.as_ref() {
        request = request.set("authorization", &format!("Bearer {token}"));
    }
    match request.send_string(&payload) {
        Ok(_) => Ok(()),
        Err(ureq::Error::Status(code, _)) => Err(format!("notify failed with http status {code}")),
        Err(ureq::Error::Transport(err)) => Err(format!("notify transport error: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(contacts: &[&str]) -> AlertJob {
        AlertJob {
            user_name: "Maria".to_string(),
            location: "https://maps.google.com/?q=1,2".to_string(),
            contacts: contacts.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn at_notifier_01_recording_delivers_per_contact() {
        let (notifier, deliveries) = NotifierRuntime::recording();
        let metrics = notifier.dispatch(&job(&["a@example.com", "b@example.com"]));

        assert_eq!(metrics.attempted, 2);
        assert_eq!(metrics.delivered, 2);
        assert_eq!(metrics.failed, 0);
        let deliveries = deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].contact, "a@example.com");
    }

    #[test]
    fn at_notifier_02_failures_are_isolated_per_contact() {
        let notifier = NotifierRuntime::AlwaysFail {
            message: "relay down".to_string(),
        };
        let metrics = notifier.dispatch(&job(&["a@example.com", "b@example.com", "c@example.com"]));

        assert_eq!(metrics.attempted, 3);
        assert_eq!(metrics.delivered, 0);
        assert_eq!(metrics.failed, 3);
    }

    #[test]
    fn at_notifier_03_no_contacts_no_attempts() {
        let notifier = NotifierRuntime::Loopback;
        let metrics = notifier.dispatch(&job(&[]));
        assert_eq!(metrics, DispatchMetrics::default());
    }

    #[test]
    fn at_notifier_04_message_body_round_trips_location() {
        let body = job(&["a@example.com"]).message_body();
        assert!(body.contains("Name: Maria"));
        assert!(body.contains("Location: https://maps.google.com/?q=1,2"));

        let mut empty_location = job(&["a@example.com"]);
        empty_location.location = String::new();
        assert!(empty_location.message_body().contains("Location: N/A"));
    }
}
