//! # XS3 Bridge Runtime
//!
//! Entry point: configuration from the environment, `RUST_LOG`-driven
//! logging, then run until Ctrl+C.

use anyhow::Result;
use bridge_runtime::{load_config, BridgeRuntime};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config();
    let runtime = BridgeRuntime::start(config)?;

    info!("Bridge is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    Ok(())
}
