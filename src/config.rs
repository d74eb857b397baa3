//! Configuration module
//!
//! Layered TOML configuration: every field has a default, so a missing
//! file or a partial file both work. Loaded from
//! `~/.config/fleet-coordinator/config.toml` unless `FLEET_CONFIG`
//! points elsewhere.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::coordinator::LivenessConfig;
use crate::infrastructure::database::DatabaseConfig;
use crate::protocol::ProtocolConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseSection,
    pub liveness: LivenessSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host for the station listener
    pub station_host: String,
    pub station_port: u16,
    /// Bind host for the operator/API listener
    pub api_host: String,
    pub api_port: u16,
    /// Idle connections are dropped after this many seconds
    pub read_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            station_host: "0.0.0.0".to_string(),
            station_port: 9090,
            api_host: "0.0.0.0".to_string(),
            api_port: 9091,
            read_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: DatabaseConfig::default().url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LivenessSection {
    pub check_interval_secs: u64,
    pub offline_after_secs: u64,
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            offline_after_secs: 90,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter, overridable via RUST_LOG
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig {
            station_addr: format!("{}:{}", self.server.station_host, self.server.station_port),
            operator_addr: format!("{}:{}", self.server.api_host, self.server.api_port),
            read_timeout: Duration::from_secs(self.server.read_timeout_secs),
        }
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.database.url.clone(),
        }
    }

    pub fn liveness_config(&self) -> LivenessConfig {
        LivenessConfig {
            check_interval_secs: self.liveness.check_interval_secs,
            offline_after_secs: self.liveness.offline_after_secs as i64,
        }
    }
}

/// Default config path: `~/.config/fleet-coordinator/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fleet-coordinator")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_sections_missing() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.server.station_port, 9090);
        assert_eq!(cfg.server.api_port, 9091);
        assert_eq!(cfg.liveness.offline_after_secs, 90);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [server]
            station_port = 7070

            [liveness]
            offline_after_secs = 45
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.station_port, 7070);
        assert_eq!(cfg.server.api_port, 9091);
        assert_eq!(cfg.liveness.offline_after_secs, 45);
        assert_eq!(cfg.liveness.check_interval_secs, 30);
    }

    #[test]
    fn protocol_config_joins_host_and_port() {
        let cfg = AppConfig::default();
        let protocol = cfg.protocol_config();
        assert_eq!(protocol.station_addr, "0.0.0.0:9090");
        assert_eq!(protocol.operator_addr, "0.0.0.0:9091");
        assert_eq!(protocol.read_timeout, Duration::from_secs(120));
    }
}
