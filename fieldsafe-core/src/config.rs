//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/fieldsafe/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/fieldsafe/` (~/.config/fieldsafe/)
//! - Data: `$XDG_DATA_HOME/fieldsafe/` (~/.local/share/fieldsafe/)
//! - State/Logs: `$XDG_STATE_HOME/fieldsafe/` (~/.local/state/fieldsafe/)

use crate::error::{Error, Result};
use crate::types::EventKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Delivery endpoint
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Queue replay behavior
    #[serde(default)]
    pub sync: SyncConfig,

    /// Identity attached to panic alerts
    #[serde(default)]
    pub reporter: ReporterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote delivery endpoint configuration
///
/// When `server_url` is unset the device is treated as permanently offline and
/// every event is queued.
#[derive(Debug, Deserialize, Clone)]
pub struct EndpointConfig {
    /// Server base URL (e.g., `https://safety.example.org`)
    pub server_url: Option<String>,

    /// Bearer token (optional)
    pub api_key: Option<String>,

    /// Path accepting SOS alerts
    #[serde(default = "default_sos_path")]
    pub sos_path: String,

    /// Path accepting anonymous reports
    #[serde(default = "default_report_path")]
    pub report_path: String,

    /// Path probed to decide whether the device is online
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            sos_path: default_sos_path(),
            report_path: default_report_path(),
            health_path: default_health_path(),
            timeout_secs: default_timeout(),
        }
    }
}

impl EndpointConfig {
    /// Check if a server is configured
    pub fn is_ready(&self) -> bool {
        self.server_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }

    /// Endpoint path for an event kind
    pub fn path_for(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Sos => &self.sos_path,
            EventKind::Report => &self.report_path,
        }
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.server_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "endpoint.server_url must start with http:// or https://, got {:?}",
                    url
                )));
            }
        }
        for (name, path) in [
            ("sos_path", &self.sos_path),
            ("report_path", &self.report_path),
            ("health_path", &self.health_path),
        ] {
            if !path.starts_with('/') {
                return Err(Error::Config(format!(
                    "endpoint.{} must start with '/', got {:?}",
                    name, path
                )));
            }
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "endpoint.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_sos_path() -> String {
    EventKind::Sos.default_path().to_string()
}

fn default_report_path() -> String {
    EventKind::Report.default_path().to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Queue replay configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Max in-flight deliveries per queue during a sync
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Interval between connectivity probes in watch mode
    #[serde(default = "default_probe_interval")]
    pub probe_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            probe_interval_ms: default_probe_interval(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 || self.max_concurrency > 64 {
            return Err(Error::Config(
                "sync.max_concurrency must be between 1 and 64".to_string(),
            ));
        }
        if self.probe_interval_ms < 100 {
            return Err(Error::Config(
                "sync.probe_interval_ms must be at least 100".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_concurrency() -> usize {
    4
}

fn default_probe_interval() -> u64 {
    5000
}

/// Reporter identity
#[derive(Debug, Deserialize, Clone)]
pub struct ReporterConfig {
    /// User id attached to SOS alerts
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
        }
    }
}

fn default_user_id() -> String {
    "user-001".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.endpoint.validate()?;
        self.sync.validate()?;
        if self.reporter.user_id.trim().is_empty() {
            return Err(Error::Config(
                "reporter.user_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/fieldsafe/config.toml` (~/.config/fieldsafe/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("fieldsafe").join("config.toml")
    }

    /// Returns the data directory path (for the queue database)
    ///
    /// `$XDG_DATA_HOME/fieldsafe/` (~/.local/share/fieldsafe/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("fieldsafe")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/fieldsafe/` (~/.local/state/fieldsafe/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("fieldsafe")
    }

    /// Returns the queue database file path
    ///
    /// `$XDG_DATA_HOME/fieldsafe/queue.db` (~/.local/share/fieldsafe/queue.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("queue.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/fieldsafe/fieldsafe.log` (~/.local/state/fieldsafe/fieldsafe.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("fieldsafe.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.endpoint.is_ready());
        assert_eq!(config.endpoint.timeout_secs, 30);
        assert_eq!(config.sync.max_concurrency, 4);
        assert_eq!(config.reporter.user_id, "user-001");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[endpoint]
server_url = "https://safety.example.org"
api_key = "sk_test"
timeout_secs = 10

[sync]
max_concurrency = 8

[reporter]
user_id = "tech-042"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert!(config.endpoint.is_ready());
        assert_eq!(config.endpoint.api_key.as_deref(), Some("sk_test"));
        assert_eq!(config.endpoint.timeout_secs, 10);
        assert_eq!(config.endpoint.path_for(EventKind::Sos), "/api/gbv/sos");
        assert_eq!(config.sync.max_concurrency, 8);
        assert_eq!(config.sync.probe_interval_ms, 5000);
        assert_eq!(config.reporter.user_id, "tech-042");
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_validation() {
        let config = EndpointConfig {
            server_url: Some("safety.example.org".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EndpointConfig {
            report_path: "api/gbv/report".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EndpointConfig {
            server_url: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(!config.is_ready());
    }

    #[test]
    fn test_sync_concurrency_bounds() {
        let config = SyncConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SyncConfig {
            max_concurrency: 65,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\nmax_concurrency = 0\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
