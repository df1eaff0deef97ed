use anyhow::{Context, Result};
use std::net::SocketAddr;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_WATCH_BUFFER: usize = 1024;

/// Server settings, read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    /// Events a slow watcher may lag behind before its stream fails
    pub watch_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            watch_buffer: DEFAULT_WATCH_BUFFER,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_address = lookup("BIND_ADDRESS")
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDRESS must be a socket address")?;

        let watch_buffer = match lookup("WATCH_BUFFER") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("WATCH_BUFFER must be a number, got {raw:?}"))?,
            None => DEFAULT_WATCH_BUFFER,
        };
        if watch_buffer == 0 {
            anyhow::bail!("WATCH_BUFFER must be greater than zero");
        }

        Ok(Self {
            bind_address,
            watch_buffer,
        })
    }
}
