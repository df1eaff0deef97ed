use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::keyer::{Keyer, DEFAULT_NAMESPACE, DEFAULT_SEPARATOR};

/// Bounds the optimistic-concurrency loop of `guaranteed_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Read-mutate-write rounds before giving up with a conflict
    pub max_attempts: u32,
    /// Pause after the first conflict; grows linearly with each further one
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 16,
            backoff: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub default_namespace: String,
    pub key_separator: String,
    pub retry: RetryPolicy,
    /// Upper bound for a single round trip; `None` waits forever
    pub request_timeout: Option<Duration>,
    /// Capacity of each watch consumer channel
    pub watch_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            key_separator: DEFAULT_SEPARATOR.to_string(),
            retry: RetryPolicy::default(),
            request_timeout: Some(Duration::from_secs(30)),
            watch_buffer: 256,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let default_namespace =
            lookup("STORE_DEFAULT_NAMESPACE").unwrap_or(defaults.default_namespace);
        let key_separator = lookup("STORE_KEY_SEPARATOR").unwrap_or(defaults.key_separator);

        let max_attempts = parse_var(&lookup, "STORE_MAX_UPDATE_ATTEMPTS")?
            .unwrap_or(defaults.retry.max_attempts);
        if max_attempts == 0 {
            anyhow::bail!("STORE_MAX_UPDATE_ATTEMPTS must be at least 1");
        }
        let backoff = parse_var::<u64>(&lookup, "STORE_UPDATE_BACKOFF_MS")?
            .map_or(defaults.retry.backoff, Duration::from_millis);

        let request_timeout = match parse_var::<u64>(&lookup, "STORE_REQUEST_TIMEOUT_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.request_timeout,
        };
        let watch_buffer =
            parse_var(&lookup, "STORE_WATCH_BUFFER")?.unwrap_or(defaults.watch_buffer);

        let config = Self {
            default_namespace,
            key_separator,
            retry: RetryPolicy::new(max_attempts, backoff),
            request_timeout,
            watch_buffer,
        };
        config.keyer()?;
        Ok(config)
    }

    pub fn keyer(&self) -> Result<Keyer> {
        Keyer::new(self.default_namespace.clone(), self.key_separator.clone())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{name} has invalid value {raw:?}: {e}")),
        None => Ok(None),
    }
}
