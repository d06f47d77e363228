//! Engine configuration loaded from environment variables.

use crate::{error::Result, Error};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Replication engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Base URL of the remote service, including any API prefix
    pub remote_url: String,
    /// Delay before the startup cycle
    pub initial_sync_delay: Duration,
    /// Attempts per record during a push, at least 1
    pub push_attempts: u32,
    /// Pause between push attempts of the same record
    pub retry_backoff: Duration,
    /// Issue a remote delete when a container is deleted locally.
    /// Item deletes always attempt one.
    pub propagate_container_deletes: bool,
    /// Fallback cache file; disabled when `None`
    pub cache_path: Option<PathBuf>,
    /// Period of the host connectivity probe
    pub probe_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            remote_url: "http://localhost:5000/api".to_string(),
            initial_sync_delay: Duration::from_millis(2000),
            push_attempts: 3,
            retry_backoff: Duration::from_millis(250),
            propagate_container_deletes: false,
            cache_path: None,
            probe_interval: Duration::from_millis(5000),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let push_attempts = parse_or(&lookup, "STOCKROOM_PUSH_ATTEMPTS", defaults.push_attempts)?;
        if push_attempts == 0 {
            return Err(Error::Config {
                key: "STOCKROOM_PUSH_ATTEMPTS".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            remote_url: lookup("STOCKROOM_REMOTE_URL").unwrap_or(defaults.remote_url),
            initial_sync_delay: millis_or(
                &lookup,
                "STOCKROOM_INITIAL_SYNC_DELAY_MS",
                defaults.initial_sync_delay,
            )?,
            push_attempts,
            retry_backoff: millis_or(&lookup, "STOCKROOM_RETRY_BACKOFF_MS", defaults.retry_backoff)?,
            propagate_container_deletes: parse_or(
                &lookup,
                "STOCKROOM_PROPAGATE_CONTAINER_DELETES",
                defaults.propagate_container_deletes,
            )?,
            cache_path: lookup("STOCKROOM_CACHE_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            probe_interval: millis_or(
                &lookup,
                "STOCKROOM_PROBE_INTERVAL_MS",
                defaults.probe_interval,
            )?,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| Error::Config {
            key: key.to_string(),
            reason: format!("cannot parse '{raw}'"),
        }),
    }
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(lookup, key, default_ms).map(Duration::from_millis)
}
