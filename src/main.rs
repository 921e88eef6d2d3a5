use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use chainpos::api::{start_server, AppState};
use chainpos::config::AppConfig;
use chainpos::crypto::PayloadCipher;
use chainpos::ledger::MemoryLedger;
use chainpos::metrics::MetricsRegistry;
use chainpos::poller::SnapshotPoller;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chainpos=info".parse()?))
        .init();

    tracing::info!("chainpos starting...");

    let config = AppConfig::from_env();
    let cipher = Arc::new(PayloadCipher::from_hex(&config.encryption_key_hex)?);

    let ledger = Arc::new(MemoryLedger::with_manager(&config.manager_address));
    tracing::info!(manager = %config.manager_address, "seeded in-process ledger");

    let registry = Arc::new(MetricsRegistry::new());

    let poller = Arc::new(SnapshotPoller::new(
        Arc::clone(&ledger),
        Arc::clone(&cipher),
        config.scan.clone(),
        config.poller.clone(),
        Arc::clone(&registry.scan),
    ));
    poller.start().await?;
    tracing::info!(
        interval_secs = config.poller.interval.as_secs(),
        max_scan_id = config.scan.max_scan_id,
        "snapshot poller started"
    );

    let state = Arc::new(AppState::new(
        ledger,
        cipher,
        Arc::clone(&poller),
        registry,
    ));

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    };
    start_server(config.server, state, shutdown).await?;

    poller.stop().await?;
    tracing::info!("chainpos stopped");

    Ok(())
}
