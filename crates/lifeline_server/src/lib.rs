#![forbid(unsafe_code)]

pub mod alert_gate;
pub mod auth;
pub mod detector;
pub mod notifier;
pub mod pipeline;
pub mod retention;

pub use alert_gate::{should_alert, ALERT_COOLDOWN_MS};
pub use auth::{derive_user_id, mint_session_token};
pub use detector::evaluate_emergency;
pub use notifier::{
    AlertJob, DispatchMetrics, NotifierRuntime, NotifierWebhookConfig, RecordedDelivery,
};
pub use pipeline::{AlertDecision, IngestError, IngestOutcome, IngestPipeline};
pub use retention::{
    run_retention_sweep_pass, RetentionSweepMetrics, RETENTION_MAX_IDLE_MS,
    SWEEP_INTERVAL_MS_DEFAULT,
};
