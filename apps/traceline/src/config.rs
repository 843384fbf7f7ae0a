//! # Configuration
//!
//! Layered configuration: built-in defaults, then an optional
//! `traceline.toml`, then `TRACELINE_*` environment variables. CLI flags
//! override all of it at the call sites that take them.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use traceline_core::LineageError;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "traceline.toml";

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// This store's numeric identity. Must be unique across the fleet;
    /// the central store is conventionally 1.
    pub store_id: u64,
    /// Database path. `None` selects an in-memory session.
    pub database: Option<PathBuf>,
    /// Host the server binds to.
    pub host: String,
    /// Port the server binds to.
    pub port: u16,
    /// Base URL of the central server, for push/pull commands.
    pub central_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_id: 1,
            database: Some(PathBuf::from("traceline.redb")),
            host: "127.0.0.1".to_string(),
            port: 8080,
            central_url: None,
        }
    }
}

impl Config {
    /// Load configuration: defaults, the config file if present, then
    /// environment overrides.
    pub fn load() -> Result<Self, LineageError> {
        let mut config = match std::fs::read_to_string(CONFIG_FILE) {
            Ok(raw) => Self::parse(&raw)?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load from an explicit file path (file must exist), then environment.
    pub fn load_from(path: &Path) -> Result<Self, LineageError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LineageError::Io(format!("cannot read config '{}': {e}", path.display()))
        })?;
        let mut config = Self::parse(&raw)?;
        config.apply_env();
        Ok(config)
    }

    fn parse(raw: &str) -> Result<Self, LineageError> {
        toml::from_str(raw).map_err(|e| LineageError::InvalidInput(format!("bad config: {e}")))
    }

    fn apply_env(&mut self) {
        if let Some(id) = env_u64("TRACELINE_STORE_ID") {
            self.store_id = id;
        }
        if let Ok(db) = std::env::var("TRACELINE_DATABASE") {
            self.database = if db == ":memory:" {
                None
            } else {
                Some(PathBuf::from(db))
            };
        }
        if let Ok(host) = std::env::var("TRACELINE_HOST") {
            self.host = host;
        }
        if let Some(port) = env_u64("TRACELINE_PORT") {
            self.port = port as u16;
        }
        if let Ok(url) = std::env::var("TRACELINE_CENTRAL_URL") {
            self.central_url = Some(url);
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// =============================================================================
// TESTS
// =============================================================================
