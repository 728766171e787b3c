//! Relay configuration from environment variables.
//!
//! Every knob has a `DEFAULT_*` constant; unset or unparsable values fall
//! back to it. `DATABASE_URL` is the one optional setting: without it the
//! relay keeps snapshots in memory.

use crate::db::DEFAULT_MAX_CONNECTIONS;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_MAX_SNAPSHOT_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Outbound frames buffered per websocket client.
    pub client_queue_capacity: usize,
    /// Largest snapshot body accepted over HTTP.
    pub max_snapshot_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
            max_snapshot_bytes: DEFAULT_MAX_SNAPSHOT_BYTES,
        }
    }
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| match std::env::var(key) {
            Ok(value) => Some(value),
            Err(_) => None,
        })
    }

    /// Build from an arbitrary key lookup (the process environment in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env_parse = |key: &str, default: usize| parse_or(key, lookup(key), default);
        Self {
            port: parse_or("PORT", lookup("PORT"), DEFAULT_PORT),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", lookup("DATABASE_MAX_CONNECTIONS"), DEFAULT_MAX_CONNECTIONS),
            client_queue_capacity: env_parse("CLIENT_QUEUE_CAPACITY", DEFAULT_CLIENT_QUEUE_CAPACITY).max(1),
            max_snapshot_bytes: env_parse("MAX_SNAPSHOT_BYTES", DEFAULT_MAX_SNAPSHOT_BYTES),
        }
    }
}

/// `raw` parsed as `T`, or `default` when unset or invalid.
fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw.map(|v| v.trim().parse::<T>()) {
        Some(Ok(value)) => value,
        Some(Err(_)) => {
            tracing::warn!(key, "ignoring unparsable configuration value; using default");
            default
        }
        None => default,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
