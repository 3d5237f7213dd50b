//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EngineError, Result};

pub const ENV_DATA_DIR: &str = "PREGRANT_DATA_DIR";
pub const ENV_POLL_INTERVAL_MS: &str = "PREGRANT_POLL_INTERVAL_MS";
pub const ENV_CALL_TIMEOUT_MS: &str = "PREGRANT_CALL_TIMEOUT_MS";
pub const ENV_THRESHOLD: &str = "PREGRANT_THRESHOLD";
pub const ENV_SHARES: &str = "PREGRANT_SHARES";

/// Configuration for an engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of all local state.
    pub data_dir: PathBuf,
    /// Pause between worker polls that found no work.
    pub poll_interval: Duration,
    /// Upper bound on any single registry or content store call.
    pub call_timeout: Duration,
    /// Fragments needed to decrypt.
    pub threshold: usize,
    /// Fragments derived per grant.
    pub shares: usize,
    /// Keep a local copy of every transformed blob.
    pub cache_transformed: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            poll_interval: Duration::from_secs(2),
            call_timeout: Duration::from_secs(10),
            threshold: 1,
            shares: 1,
            cache_transformed: true,
        }
    }
}

impl EngineConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `PREGRANT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(ms) = lookup(ENV_POLL_INTERVAL_MS) {
            config.poll_interval = Duration::from_millis(parse(ENV_POLL_INTERVAL_MS, &ms)?);
        }
        if let Some(ms) = lookup(ENV_CALL_TIMEOUT_MS) {
            config.call_timeout = Duration::from_millis(parse(ENV_CALL_TIMEOUT_MS, &ms)?);
        }
        if let Some(n) = lookup(ENV_THRESHOLD) {
            config.threshold = parse(ENV_THRESHOLD, &n)?;
        }
        if let Some(n) = lookup(ENV_SHARES) {
            config.shares = parse(ENV_SHARES, &n)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(EngineError::Config("threshold must be at least 1".into()));
        }
        if self.threshold > self.shares {
            return Err(EngineError::Config(format!(
                "threshold {} exceeds shares {}",
                self.threshold, self.shares
            )));
        }
        if self.call_timeout.is_zero() {
            return Err(EngineError::Config("call timeout must be non-zero".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(EngineError::Config("poll interval must be non-zero".into()));
        }
        Ok(())
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("registry.json")
    }

    pub fn content_db_path(&self) -> PathBuf {
        self.data_dir.join("content.db")
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.data_dir.join("keys")
    }

    pub fn fragments_dir(&self) -> PathBuf {
        self.data_dir.join("fragments")
    }

    pub fn transformed_dir(&self) -> PathBuf {
        self.data_dir.join("transformed")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| EngineError::Config(format!("{}: cannot parse {:?}", key, value)))
}
