use anyhow::Result;
use rest_store::{MemoryTransport, Transport};
use server::{config::ServerConfig, http};
use std::sync::Arc;
use tracing::{Level, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    info!("Starting object store backend");

    let config = ServerConfig::from_env()?;
    info!("Watch buffer: {} events", config.watch_buffer);

    let transport: Arc<dyn Transport> =
        Arc::new(MemoryTransport::with_capacity(config.watch_buffer));

    http::start_server(transport, config.bind_address).await?;

    Ok(())
}
