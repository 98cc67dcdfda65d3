//! StratLab server entry point.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stratlab_server::{build_engine, Server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,stratlab=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("StratLab Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/stratlab.toml".to_string());
    info!("Loading configuration from {} (if present)", config_path);
    let server_config = ServerConfig::load(&config_path)?;

    // Build and start engine
    let engine = Arc::new(build_engine(&server_config)?);
    engine.start();

    // Start server
    let server = Server::new(server_config, engine.clone());
    let served = server.start().await;

    engine.shutdown().await;
    served?;
    Ok(())
}
