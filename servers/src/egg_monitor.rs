use anyhow::{Context, Result};

mod eggtec_logic;
use eggtec_logic::{config, monitor};
use lib_common::connections::mask_url_password;
use lib_common::loggers::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config()?;
    let _guard = init_tracing(&config.log_dir, "egg_monitor.log", &config.log_level)
        .context("initializing logging")?;
    tracing::info!(
        "Configuration loaded: database {}, {} channels, API port {}",
        mask_url_password(&config.database_url),
        config.channels.len(),
        config.api_port
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let tasks = monitor::start(&config, &shutdown_tx).await?;

    monitor::shutdown_signal().await;
    let _ = shutdown_tx.send(());
    monitor::join_all(tasks).await;

    tracing::info!("Shutdown complete.");
    Ok(())
}
