//! Client identity and monitor settings, optionally read from a JSON file.

use std::path::{Path, PathBuf};

use rivian_monitor::MonitorConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const DEFAULT_CLIENT_NAME: &str = "com.rivian.ios.consumer-apollo-ios";
pub const DEFAULT_CLIENT_VERSION: &str = "1.13.0-1494";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Sent as `client-name` in `connection_init`
    pub client_name: String,
    /// Sent as `client-version` in `connection_init`
    pub client_version: String,
    pub monitor: MonitorConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_version: DEFAULT_CLIENT_VERSION.to_string(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Read a JSON config file; absent fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `connection_init` payload for one connection attempt.
///
/// `dc-cid` is fresh on every call, so each reconnection identifies as a
/// new client connection.
pub fn connection_init_payload(config: &ClientConfig, user_session_token: &str) -> Value {
    json!({
        "client-name": config.client_name,
        "client-version": config.client_version,
        "dc-cid": format!("m-ios-{}", uuid::Uuid::new_v4()),
        "u-sess": user_session_token,
    })
}
