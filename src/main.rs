use aethelgard::application::system::System;
use aethelgard::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!(symbols = ?config.symbols, mode = ?config.mode, "starting Aethelgard");

    let system = System::start(&config).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    system.shutdown().await?;
    Ok(())
}
