//! Configuration for Warren
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for Warren
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarrenConfig {
    /// Actor runtime configuration
    #[serde(default)]
    pub actor: ActorConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl WarrenConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfiguration {
            field: "config_file".into(),
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        serde_json::from_str(&raw).map_err(|e| Error::InvalidConfiguration {
            field: "config_file".into(),
            reason: format!("cannot parse {}: {}", path.display(), e),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.actor.validate()?;
        self.storage.validate()?;
        self.server.validate()?;
        Ok(())
    }
}

/// Actor runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Maximum concurrent actors in this process
    #[serde(default = "default_max_actors")]
    pub max_actors_count: usize,

    /// Actor idle timeout before deactivation (milliseconds)
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Maximum mailbox depth per actor
    #[serde(default = "default_mailbox_depth")]
    pub mailbox_depth_max: usize,

    /// Name of the state store actors write to by default
    #[serde(default = "default_store_name")]
    pub state_store_name: String,
}

fn default_max_actors() -> usize {
    100_000
}

fn default_idle_timeout_ms() -> u64 {
    ACTOR_IDLE_TIMEOUT_MS_DEFAULT
}

fn default_mailbox_depth() -> usize {
    MAILBOX_DEPTH_DEFAULT
}

fn default_store_name() -> String {
    STATE_STORE_NAME_DEFAULT.to_string()
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            max_actors_count: default_max_actors(),
            idle_timeout_ms: default_idle_timeout_ms(),
            mailbox_depth_max: default_mailbox_depth(),
            state_store_name: default_store_name(),
        }
    }
}

impl ActorConfig {
    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<()> {
        if self.max_actors_count == 0 || self.max_actors_count > ACTOR_CONCURRENT_COUNT_MAX {
            return Err(Error::InvalidConfiguration {
                field: "actor.max_actors_count".into(),
                reason: format!(
                    "{} must be in 1..={}",
                    self.max_actors_count, ACTOR_CONCURRENT_COUNT_MAX
                ),
            });
        }

        if self.idle_timeout_ms < ACTOR_IDLE_TIMEOUT_MS_MIN
            || self.idle_timeout_ms > ACTOR_IDLE_TIMEOUT_MS_MAX
        {
            return Err(Error::InvalidConfiguration {
                field: "actor.idle_timeout_ms".into(),
                reason: format!(
                    "{} must be in {}..={}",
                    self.idle_timeout_ms, ACTOR_IDLE_TIMEOUT_MS_MIN, ACTOR_IDLE_TIMEOUT_MS_MAX
                ),
            });
        }

        if self.mailbox_depth_max == 0 || self.mailbox_depth_max > MAILBOX_DEPTH_MAX {
            return Err(Error::InvalidConfiguration {
                field: "actor.mailbox_depth_max".into(),
                reason: format!(
                    "{} must be in 1..={}",
                    self.mailbox_depth_max, MAILBOX_DEPTH_MAX
                ),
            });
        }

        if self.state_store_name.is_empty() || !crate::actor::is_valid_name(&self.state_store_name)
        {
            return Err(Error::InvalidConfiguration {
                field: "actor.state_store_name".into(),
                reason: "must be a non-empty name of alphanumerics, '-', '_' or '.'".into(),
            });
        }

        Ok(())
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend type
    #[serde(default)]
    pub backend: StorageBackend,

    /// Data directory (for the file backend)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Storage backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-memory storage (state is lost on exit)
    #[default]
    Memory,

    /// JSON snapshot files in a data directory
    File,
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        if self.backend == StorageBackend::File && self.data_dir.is_none() {
            return Err(Error::InvalidConfiguration {
                field: "storage.data_dir".into(),
                reason: "required when backend is file".into(),
            });
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Tokio worker threads; `None` uses one per core
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            worker_threads: None,
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<()> {
        if !self.bind_address.contains(':') {
            return Err(Error::InvalidConfiguration {
                field: "server.bind_address".into(),
                reason: "must be in host:port format".into(),
            });
        }
        if self.worker_threads == Some(0) {
            return Err(Error::InvalidConfiguration {
                field: "server.worker_threads".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}
