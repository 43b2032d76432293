use anyhow::{Context, Result};
use flowline_server::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from flowline.toml and FLOWLINE_* variables
    let config = ServerConfig::load().context("Failed to load configuration")?;

    flowline_monitoring::init_logging(&config.monitoring())
        .context("Failed to initialize logging")?;

    // Run the server using the library's run function
    flowline_server::run(config).await.context("Server error")?;

    Ok(())
}
