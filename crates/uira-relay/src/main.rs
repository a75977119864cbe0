//! `uira-relay` binary entrypoint.
//!
//! Loads configuration from environment variables (and `RELAY_CONFIG`, when
//! set) and starts the Actix server.

use anyhow::Context;
use uira_relay::{serve, RelayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Respect `RUST_LOG` if set; otherwise default to relay-friendly info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::load().context("failed to load relay configuration")?;
    serve(config).await
}
