use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::errors::ConfigError;

/// Command line arguments of the hub binary.
#[derive(Debug, Parser)]
#[command(name = "websub-hub")]
#[command(about = "WebSub-style publish/subscribe hub")]
pub struct Args {
    /// Path to the JSON configuration file.
    ///
    /// Defaults to `config.json` next to the executable (or one directory up).
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// HTTP port to listen on.
    pub port: u16,

    /// Log level for tracing (e.g. "info", "debug").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path to the subscription snapshot JSON file.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    #[serde(default = "default_server_version")]
    pub server_version: String,

    /// Public URL of this hub, advertised as `rel="hub"` on every delivery.
    ///
    /// When omitted, `http://localhost:<port>/` is used.
    #[serde(default)]
    pub hub_url: Option<String>,

    /// Timeout (seconds) applied to every outbound call: verification GETs,
    /// topic fetches and subscriber deliveries.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Lease recorded when a subscriber omits `hub.lease_seconds`.
    #[serde(default = "default_lease_seconds")]
    pub default_lease_seconds: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_snapshot_path() -> String {
    "subscriptions.json".to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_lease_seconds() -> u64 {
    3600
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_json(&file)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str::<AppConfig>(text)?)
    }

    /// Resolve the configuration file: explicit path first, then the
    /// executable's directory, then its parent.
    pub fn locate(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path);
        }

        let exe_path = std::env::current_exe().map_err(|source| ConfigError::Read {
            path: PathBuf::from("<current executable>"),
            source,
        })?;
        let exe_dir = exe_path.parent().unwrap_or_else(|| Path::new("."));

        let candidates = [
            exe_dir.join("config.json"),
            exe_dir.join("..").join("config.json"),
        ];

        candidates
            .iter()
            .find(|p| p.exists())
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(candidates.to_vec()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn hub_url(&self) -> String {
        self.hub_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}/", self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = AppConfig::from_json(r#"{ "port": 9090 }"#).unwrap();

        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.snapshot_path, "subscriptions.json");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.default_lease_seconds, 3600);
        assert_eq!(cfg.hub_url(), "http://localhost:9090/");
    }

    #[test]
    fn explicit_hub_url_wins() {
        let cfg = AppConfig::from_json(
            r#"{ "port": 80, "hub_url": "https://hub.example/", "request_timeout_secs": 3 }"#,
        )
        .unwrap();

        assert_eq!(cfg.hub_url(), "https://hub.example/");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn missing_port_is_rejected() {
        assert!(AppConfig::from_json(r#"{ "log_level": "debug" }"#).is_err());
    }

    #[test]
    fn explicit_path_is_used_as_is() {
        let path = PathBuf::from("/tmp/some-hub.json");
        assert_eq!(AppConfig::locate(Some(path.clone())).unwrap(), path);
    }
}
