use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

const MB: u64 = 1024 * 1024;

/// Environment variable holding the config file path
pub const CONFIG_PATH_ENV: &str = "CLOUDCLIP_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Listen address(es): a single host or a list, only the first one is bound
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum HostSetting {
    One(String),
    Many(Vec<String>),
}

impl HostSetting {
    pub fn primary(&self) -> &str {
        match self {
            HostSetting::One(host) => host,
            HostSetting::Many(hosts) => hosts.first().map(String::as_str).unwrap_or("0.0.0.0"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub host: HostSetting,
    pub port: u16,
    /// URL prefix the routes are mounted under, e.g. "/clip"
    pub prefix: String,
    /// Capacity of the event log
    pub history: usize,
    pub history_file: String,
    pub room_list: bool,
    /// Seconds between idle-room sweeps, also the idle threshold; <= 0 disables
    pub room_cleanup: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: HostSetting::Many(vec!["0.0.0.0".to_string()]),
            port: 9501,
            prefix: String::new(),
            history: 100,
            history_file: "history.json".to_string(),
            room_list: false,
            room_cleanup: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextConfig {
    /// Maximum text length in bytes
    pub limit: u64,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self { limit: 4096 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    /// Seconds an uploaded file is kept
    pub expire: i64,
    pub chunk: u64,
    pub limit: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            expire: 3600,
            chunk: 2 * MB,
            limit: 256 * MB,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub text: TextConfig,
    pub file: FileConfig,
}

impl Config {
    /// Reads and parses a config file; missing keys take their defaults
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Like `load`, but never fails: a missing file is created with the defaults,
    /// an unreadable one is reported and replaced by the defaults in memory
    pub async fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path).await {
            Ok(config) => {
                info!(path = %path.display(), "Config loaded");
                config
            }
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                match serde_json::to_vec_pretty(&config) {
                    Ok(data) => match tokio::fs::write(path, data).await {
                        Ok(()) => info!(path = %path.display(), "Wrote default config"),
                        Err(e) => warn!(path = %path.display(), error = %e, "Failed to write default config"),
                    },
                    Err(e) => warn!(error = %e, "Failed to encode default config"),
                }
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Using default config");
                Self::default()
            }
        }
    }

    /// Address to bind, `host:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host.primary(), self.server.port)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            version: env!("CARGO_PKG_VERSION").to_string(),
            server: ClientServerConfig {
                prefix: self.server.prefix.clone(),
                room_list: self.server.room_list,
            },
            text: self.text.clone(),
            file: self.file.clone(),
            auth: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientServerConfig {
    pub prefix: String,
    pub room_list: bool,
}

/// The part of the configuration sent to clients in the `config` event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub version: String,
    pub server: ClientServerConfig,
    pub text: TextConfig,
    pub file: FileConfig,
    pub auth: bool,
}
