//! Client config load/save for `~/.legis-query/config.yaml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_PATH: &str = "/ws";

/// Server section (url, or host/port/path).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ServerSection {
    /// Full WebSocket URL; takes precedence over host/port/path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Client section (bounded wait).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClientSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
}

impl Config {
    /// WebSocket URL of the query service.
    pub fn endpoint(&self) -> String {
        if let Some(url) = &self.server.url {
            return url.clone();
        }
        let host = self.server.host.as_deref().unwrap_or(DEFAULT_HOST);
        let port = self.server.port.unwrap_or(DEFAULT_PORT);
        let path = self.server.path.as_deref().unwrap_or(DEFAULT_PATH);
        if path.starts_with('/') {
            format!("ws://{}:{}{}", host, port, path)
        } else {
            format!("ws://{}:{}/{}", host, port, path)
        }
    }

    /// Bounded wait for one query; `None` waits indefinitely.
    pub fn timeout(&self) -> Option<Duration> {
        self.client.timeout_secs.map(Duration::from_secs)
    }
}

/// Returns the default config file path: `~/.legis-query/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    let home = home_dir()?;
    Some(home.join(".legis-query").join("config.yaml"))
}

#[cfg(unix)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(windows)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[cfg(not(any(unix, windows)))]
fn home_dir() -> Option<PathBuf> {
    None
}

/// Load config from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Save config to a YAML file. Creates parent directory if missing.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_matches_service_defaults() {
        assert_eq!(Config::default().endpoint(), "ws://127.0.0.1:8000/ws");
        assert_eq!(Config::default().timeout(), None);
    }

    #[test]
    fn endpoint_from_parts_and_url() {
        let mut cfg = Config::default();
        cfg.server.host = Some("example.org".into());
        cfg.server.port = Some(9000);
        cfg.server.path = Some("query".into());
        assert_eq!(cfg.endpoint(), "ws://example.org:9000/query");

        cfg.server.url = Some("wss://api.example.org/ws".into());
        assert_eq!(cfg.endpoint(), "wss://api.example.org/ws");
    }

    #[test]
    fn bad_yaml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server: [not, a, map]").unwrap();
        assert!(matches!(load(&path), Err(ConfigError::Yaml(_))));
        assert!(matches!(
            load(&dir.path().join("missing.yaml")),
            Err(ConfigError::Io(_))
        ));
    }
}
