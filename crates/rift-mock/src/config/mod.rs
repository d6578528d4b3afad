//! Configuration for the mock server binary.
//!
//! Loaded from a YAML (or JSON) file; every section is optional and falls back to
//! defaults. CLI flags override the file, see `main.rs`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::recording::DEFAULT_MAX_ENTRIES;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub forward: ForwardConfig,

    #[serde(default)]
    pub log: LogConfig,

    /// JSON array of expectations loaded at start-up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialization_json: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            forward: ForwardConfig::default(),
            log: LogConfig::default(),
            initialization_json: None,
        }
    }
}

/// Upstream client settings used by forwarding actions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ForwardConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            accept_invalid_certs: false,
        }
    }
}

impl ForwardConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Oldest entries are evicted beyond this many
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

fn default_port() -> u16 {
    1080
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.forward.connect_timeout_ms == 0 {
            anyhow::bail!("forward.connect_timeout_ms must be greater than 0");
        }
        if self.forward.request_timeout_ms == 0 {
            anyhow::bail!("forward.request_timeout_ms must be greater than 0");
        }
        if self.log.max_entries == 0 {
            anyhow::bail!("log.max_entries must be greater than 0");
        }
        if let Some(path) = &self.initialization_json {
            if !path.is_file() {
                anyhow::bail!(
                    "initialization_json '{}' does not exist or is not a file",
                    path.display()
                );
            }
        }
        Ok(())
    }
}
