//! Connection settings for the SHSWorks client.
//!
//! A small JSON settings file keeps lab scripts free of hard-coded
//! host/port pairs:
//!
//! ```json
//! { "host": "192.168.1.40", "port": 29800 }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::protocol::session::{DEFAULT_BUSY_RETRY_LIMIT, DEFAULT_PORT};

/// Settings file name inside the config directory.
const CONFIG_FILE_NAME: &str = "client.json";

/// Environment variable overriding the settings file location.
const CONFIG_PATH_VAR: &str = "SHSWORKS_CLIENT_CONFIG";

/// Client connection settings. Every field has a default, so an empty
/// object (or a missing file handled by the caller) is a valid
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Host running SHSWorks.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP/IP remote-control port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Stop-live rounds before a blocked instrument is reported as still
    /// busy.
    #[serde(default = "default_busy_retry_limit")]
    pub busy_retry_limit: u32,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_busy_retry_limit() -> u32 {
    DEFAULT_BUSY_RETRY_LIMIT
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: default_host(),
            port: default_port(),
            busy_retry_limit: default_busy_retry_limit(),
        }
    }
}

impl ClientConfig {
    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Load settings from the default path, falling back to defaults when
    /// no file exists.
    pub fn load_default() -> Result<Self> {
        let path = default_config_path();
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Resolve the default settings file location.
///
/// Resolution order:
/// 1. `$SHSWORKS_CLIENT_CONFIG` (explicit override)
/// 2. `<platform config dir>/shsworks/client.json`
/// 3. `shsworks-client.json` in the working directory (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
        return PathBuf::from(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("shsworks").join(CONFIG_FILE_NAME);
    }

    PathBuf::from("shsworks-client.json")
}
