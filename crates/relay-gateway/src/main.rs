//! Relay gateway binary.

use anyhow::{Context, Result};
use relay_gateway::{init_logging, LoggingConfig, RelayConfig, RelayService};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&LoggingConfig::from_env())?;

    let config = RelayConfig::from_env().context("loading relay configuration")?;
    info!(
        addr = %config.http.addr,
        redis = config.bus.redis_url.is_some(),
        store = %config.rate_limit.store,
        "Starting relay gateway"
    );

    let service = RelayService::new(config)?;
    service
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
        })
        .await?;

    Ok(())
}
