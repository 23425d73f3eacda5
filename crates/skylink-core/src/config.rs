//! Configuration system for Skylink.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SKYLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/skylink/config.toml
//!   3. ~/.config/skylink/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::endpoint::{AddrError, BootstrapAddr};
use crate::identity::Uid;
use crate::wire::{DEFAULT_API_PORT, DEFAULT_REGISTRY_PORT, HANDSHAKE_TIMEOUT_SECS};

/// Parent identity used when none is configured.
pub const DEFAULT_PARENT_UID: &str = "6f1c2b7e-94d0-4c55-8a3e-2d5b1f0a7c91";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkylinkConfig {
    pub client: ClientSettings,
    pub registry: RegistrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Application identity clients register under.
    pub parent_uid: String,
    /// Registry locations, tried in order. `tcp://host:port`.
    pub bootstrap: Vec<String>,
    /// Registration must finish within this many milliseconds.
    pub register_timeout_ms: u64,
    /// Grace period for `stop`.
    pub stop_grace_secs: u64,
    /// Depth of the per-client outbound frame queue.
    pub outbound_queue: usize,
    /// Envelopes a stream holds for its consumer. Further frames are dropped.
    pub inbound_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// TCP listen address for client connections.
    pub listen_addr: String,
    /// Status API port on 127.0.0.1. 0 = disabled.
    pub api_port: u16,
    /// Connections must register within this many seconds.
    pub handshake_timeout_secs: u64,
    /// Depth of each connected client's relay queue.
    pub client_queue: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            parent_uid: DEFAULT_PARENT_UID.to_string(),
            bootstrap: vec![format!("tcp://127.0.0.1:{DEFAULT_REGISTRY_PORT}")],
            register_timeout_ms: 5_000,
            stop_grace_secs: 5,
            outbound_queue: 1024,
            inbound_buffer: 1024,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{DEFAULT_REGISTRY_PORT}"),
            api_port: DEFAULT_API_PORT,
            handshake_timeout_secs: HANDSHAKE_TIMEOUT_SECS,
            client_queue: 1024,
        }
    }
}

impl ClientSettings {
    pub fn parent(&self) -> Result<Uid, ConfigError> {
        self.parent_uid
            .parse()
            .map_err(|e| ConfigError::InvalidParentUid(self.parent_uid.clone(), e))
    }

    pub fn bootstrap_addrs(&self) -> Result<Vec<BootstrapAddr>, ConfigError> {
        if self.bootstrap.is_empty() {
            return Err(ConfigError::NoBootstrap);
        }
        self.bootstrap
            .iter()
            .map(|s| s.parse().map_err(ConfigError::InvalidBootstrap))
            .collect()
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("skylink")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid parent uid {0:?}: {1}")]
    InvalidParentUid(String, uuid::Error),
    #[error("invalid bootstrap address: {0}")]
    InvalidBootstrap(AddrError),
    #[error("no bootstrap addresses configured")]
    NoBootstrap,
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl SkylinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load a config file, falling back to defaults if it does not exist.
    /// No env overrides are applied.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(SkylinkConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SKYLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    fn write_default_to(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text = toml::to_string_pretty(&SkylinkConfig::default())
            .map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Apply SKYLINK_* overrides. `lookup` is `std::env::var` in production.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SKYLINK_CLIENT__PARENT_UID") {
            self.client.parent_uid = v;
        }
        if let Some(v) = lookup("SKYLINK_CLIENT__BOOTSTRAP") {
            self.client.bootstrap = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("SKYLINK_CLIENT__REGISTER_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.client.register_timeout_ms = ms;
            }
        }
        if let Some(v) = lookup("SKYLINK_CLIENT__STOP_GRACE_SECS") {
            if let Ok(s) = v.parse() {
                self.client.stop_grace_secs = s;
            }
        }
        if let Some(v) = lookup("SKYLINK_CLIENT__OUTBOUND_QUEUE") {
            if let Ok(n) = v.parse() {
                self.client.outbound_queue = n;
            }
        }
        if let Some(v) = lookup("SKYLINK_CLIENT__INBOUND_BUFFER") {
            if let Ok(n) = v.parse() {
                self.client.inbound_buffer = n;
            }
        }
        if let Some(v) = lookup("SKYLINK_REGISTRY__LISTEN_ADDR") {
            self.registry.listen_addr = v;
        }
        if let Some(v) = lookup("SKYLINK_REGISTRY__API_PORT") {
            if let Ok(p) = v.parse() {
                self.registry.api_port = p;
            }
        }
        if let Some(v) = lookup("SKYLINK_REGISTRY__HANDSHAKE_TIMEOUT_SECS") {
            if let Ok(s) = v.parse() {
                self.registry.handshake_timeout_secs = s;
            }
        }
        if let Some(v) = lookup("SKYLINK_REGISTRY__CLIENT_QUEUE") {
            if let Ok(n) = v.parse() {
                self.registry.client_queue = n;
            }
        }
    }
}
