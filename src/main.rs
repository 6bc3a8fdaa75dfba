// src/main.rs
//! Binary entrypoint: loads configuration, boots the scrape service,
//! arms every scheduled job, and runs until Ctrl-C.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pulsewire::store::MemoryStore;
use pulsewire::{AppConfig, ScrapeService};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pulsewire=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env()?;
    let store = Arc::new(MemoryStore::new());
    let service = ScrapeService::new(&config, store.clone(), store)?;

    let failures = service.start();
    for (job, err) in &failures {
        error!(job = %job, error = %err, "job failed to start");
    }
    if !failures.is_empty() && service.job_names().is_empty() {
        anyhow::bail!("no job could be started");
    }

    info!("pulsewire running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    let stopped = service.stop_all();
    info!(stopped, "shutdown complete");
    Ok(())
}
