//! Port Agent entry point.
//!
//! Loads `.env`, initializes tracing from `LOG_LEVEL` (overridable with
//! `RUST_LOG`), builds the settings and hands control to the supervisor.
//! Exits non-zero on configuration errors or a prolonged polling failure
//! window.

use anyhow::Context;
use clap::Parser;
use tracing::info;

use port_agent::config::Settings;

/// Self-hosted execution agent for Port action runs.
#[derive(Parser)]
#[command(name = "port-agent", version, about)]
struct Cli {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Cli::parse();
    dotenv::dotenv().ok();

    let settings = Settings::from_env().context("failed to load agent settings")?;

    let default_filter = settings.log_level.to_lowercase();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_filter)),
        )
        .init();

    info!("starting Port agent v{}", port_agent::VERSION);
    port_agent::agent::run(settings)
        .await
        .context("agent terminated with an error")?;

    info!("agent shutdown complete");
    Ok(())
}
