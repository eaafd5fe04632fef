//! Key service configuration.

use crate::error::{KeyServiceError, KeyServiceResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`KeyService`](crate::KeyService) and its disk cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyServiceConfig {
    /// How long a cached key is served as fresh (milliseconds).
    pub cache_ttl_ms: u64,

    /// Base directory for the disk cache. When unset, `/dev/shm` and then
    /// the OS temp directory are probed.
    pub cache_dir: Option<PathBuf>,

    /// Prefix for hashed cache filenames and the per-user cache subdirectory.
    pub cache_namespace: String,

    /// Write refreshed keys through to disk on a detached thread.
    pub warm_cache_in_background: bool,
}

impl Default for KeyServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 60_000,
            cache_dir: None,
            cache_namespace: "keymanager".to_string(),
            warm_cache_in_background: true,
        }
    }
}

impl KeyServiceConfig {
    pub const ENV_CACHE_TTL_MS: &'static str = "KEYSERVICE_CACHE_TTL_MS";
    pub const ENV_CACHE_DIR: &'static str = "KEYSERVICE_CACHE_DIR";
    pub const ENV_CACHE_NAMESPACE: &'static str = "KEYSERVICE_CACHE_NAMESPACE";
    pub const ENV_CACHE_BACKGROUND: &'static str = "KEYSERVICE_CACHE_BACKGROUND";

    /// Defaults overlaid with any `KEYSERVICE_*` environment variables.
    pub fn from_env() -> KeyServiceResult<Self> {
        let mut config = Self::default();

        if let Some(ttl) = env_var(Self::ENV_CACHE_TTL_MS) {
            config.cache_ttl_ms = ttl.parse().map_err(|_| {
                KeyServiceError::Config(format!(
                    "{} must be an integer, got {ttl:?}",
                    Self::ENV_CACHE_TTL_MS
                ))
            })?;
        }
        if let Some(dir) = env_var(Self::ENV_CACHE_DIR) {
            config.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(namespace) = env_var(Self::ENV_CACHE_NAMESPACE) {
            config.cache_namespace = namespace;
        }
        if let Some(flag) = env_var(Self::ENV_CACHE_BACKGROUND) {
            config.warm_cache_in_background = parse_flag(&flag).ok_or_else(|| {
                KeyServiceError::Config(format!(
                    "{} must be true or false, got {flag:?}",
                    Self::ENV_CACHE_BACKGROUND
                ))
            })?;
        }

        Ok(config)
    }

    /// The staleness window as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
