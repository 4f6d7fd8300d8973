use std::path::Path;
use std::time::Duration;

use anyhow::{Result, ensure};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

fn default_lock_pool_capacity() -> usize {
    128
}

fn default_request_lock_timeout_ms() -> u64 {
    60_000
}

fn default_compress_min_length() -> usize {
    512
}

fn default_store_max_entries() -> usize {
    10_000
}

fn default_store_entry_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Number of cache-population slots available across the whole process.
    #[serde(default = "default_lock_pool_capacity")]
    pub lock_pool_capacity: usize,
    /// Upper bound on waiting for a slot or for another task's population.
    #[serde(default = "default_request_lock_timeout_ms")]
    pub request_lock_timeout_ms: u64,
    /// Bodies at or above this length are gzip-compressed before storage.
    #[serde(default = "default_compress_min_length")]
    pub compress_min_length: usize,
    #[serde(default = "default_store_max_entries")]
    pub store_max_entries: usize,
    #[serde(default = "default_store_entry_ttl_secs")]
    pub store_entry_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lock_pool_capacity: default_lock_pool_capacity(),
            request_lock_timeout_ms: default_request_lock_timeout_ms(),
            compress_min_length: default_compress_min_length(),
            store_max_entries: default_store_max_entries(),
            store_entry_ttl_secs: default_store_entry_ttl_secs(),
        }
    }
}

impl Settings {
    /// Load settings from an optional file, with `CACHEGATE__` environment
    /// overrides applied on top.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("CACHEGATE")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().map_err(to_anyhow)?;
        let settings: Settings = cfg.try_deserialize().map_err(to_anyhow)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn request_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.request_lock_timeout_ms)
    }

    pub fn store_entry_ttl(&self) -> Duration {
        Duration::from_secs(self.store_entry_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.lock_pool_capacity > 0,
            "lock_pool_capacity must be at least 1 (got {})",
            self.lock_pool_capacity
        );
        ensure!(
            self.request_lock_timeout_ms > 0,
            "request_lock_timeout_ms must be greater than 0 (got {})",
            self.request_lock_timeout_ms
        );
        ensure!(
            self.store_max_entries > 0,
            "store_max_entries must be at least 1 (got {})",
            self.store_max_entries
        );
        ensure!(
            self.store_entry_ttl_secs > 0,
            "store_entry_ttl_secs must be greater than 0 seconds (got {})",
            self.store_entry_ttl_secs
        );
        Ok(())
    }
}

fn to_anyhow(err: ConfigError) -> anyhow::Error {
    anyhow::anyhow!(err)
}
