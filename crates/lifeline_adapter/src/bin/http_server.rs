#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lifeline_adapter::{epoch_now, router, AdapterRuntime};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let runtime = Arc::new(AdapterRuntime::default_from_env());
    let addr: SocketAddr = runtime.config().bind.parse()?;
    let sweep_interval_ms = runtime.config().sweep_interval_ms;

    let runtime_for_sweeper = Arc::clone(&runtime);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(sweep_interval_ms));
        // the immediate first tick would sweep an empty store
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match runtime_for_sweeper.run_sweep_pass(epoch_now()) {
                Ok(metrics) => info!(
                    examined = metrics.examined,
                    evicted = metrics.evicted,
                    sessions_revoked = metrics.sessions_revoked,
                    "retention sweep pass complete"
                ),
                Err(reason) => error!(%reason, "retention sweep pass failed"),
            }
        }
    });

    let app = router(Arc::clone(&runtime));
    info!(%addr, sweep_interval_ms, "lifeline_http listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
