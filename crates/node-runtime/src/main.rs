//! # Quantum-Chain LLMQ Node
//!
//! Runs the long-living masternode quorum subsystem.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (TOML file from `QC_CONFIG`, then environment)
//! 2. Install the tracing subscriber
//! 3. Build the node container and start the quorum event loop
//! 4. Run until Ctrl+C, then shut down gracefully

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use node_runtime::{NodeConfig, NodeRuntime};

/// Load configuration from file and environment.
fn load_config() -> Result<NodeConfig> {
    let mut config = match std::env::var("QC_CONFIG") {
        Ok(path) => NodeConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        Err(_) => NodeConfig::default(),
    };
    config
        .apply_env_overrides(|var| std::env::var(var).ok())
        .context("Invalid environment override")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log filter")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let runtime = NodeRuntime::new(config)?;
    runtime.start().await?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;

    Ok(())
}
