#![forbid(unsafe_code)]

use std::env;
use std::sync::{Arc, Mutex};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lifeline_adapter::DeviceTicker;
use lifeline_device::evaluator::{EvaluatorConfig, PeriodicEvaluator};
use lifeline_device::signal_cache::SharedSignalCache;
use lifeline_device::uplink::UplinkRuntime;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EvaluatorConfig::from_env()?;
    let uplink = UplinkRuntime::from_env_or_loopback();
    let cache = SharedSignalCache::new();

    let device_id = device_id_from_env_or_generated();
    let user_name = env::var("LIFELINE_USER_NAME").unwrap_or_else(|_| "Unnamed".to_string());
    let contacts: Vec<String> = env::var("LIFELINE_CONTACTS")
        .map(|v| {
            v.split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default();
    cache.set_profile(user_name.clone(), contacts);

    match uplink.login(&device_id, &user_name) {
        Ok(token) => {
            cache.set_auth_token(token);
            info!(%device_id, "device authenticated");
        }
        Err(err) => {
            // ticks will keep failing until the next agent restart logs in
            warn!(error = %err, "device login failed");
        }
    }

    let tick_interval_ms = config.tick_interval_ms;
    let evaluator = Arc::new(Mutex::new(PeriodicEvaluator::new(config, cache, uplink)));
    let mut ticker = DeviceTicker::new();
    ticker.arm(tick_interval_ms, evaluator);
    info!(tick_interval_ms, "device agent armed");

    tokio::signal::ctrl_c().await?;
    ticker.disarm();
    info!("device agent stopped");
    Ok(())
}

/// The device identifier is stable when supplied by the environment; a
/// generated one lasts for the lifetime of this process only.
fn device_id_from_env_or_generated() -> String {
    if let Ok(value) = env::var("LIFELINE_DEVICE_ID") {
        let value = value.trim().to_string();
        if value.len() >= 10 {
            return value;
        }
    }
    use std::fmt::Write as _;
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    let mut id = String::with_capacity(32);
    for b in bytes {
        let _ = write!(id, "{b:02x}");
    }
    id
}
