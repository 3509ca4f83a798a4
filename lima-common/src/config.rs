//! Configuration loading and config file resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "LIMA_CONFIG";

/// Dashboard configuration
///
/// Every field has a compiled default, so an empty or missing TOML file
/// yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// HTTP listen address
    pub bind_addr: String,
    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,
    /// How long each alert stays visible
    pub notification_duration_ms: u64,
    /// EventBus buffer per subscriber
    pub event_bus_capacity: usize,
    /// Characters of the submitter id shown when no profile is available
    pub fallback_id_len: usize,
    /// Upper bound on one profile lookup; expiry counts as a failed lookup
    pub profile_timeout_ms: u64,
    /// Optional JSON file used to seed the in-process store
    pub seed_file: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5760".to_string(),
            log_level: "info".to_string(),
            notification_duration_ms: 5000,
            event_bus_capacity: 256,
            fallback_id_len: 8,
            profile_timeout_ms: 1000,
            seed_file: None,
        }
    }
}

impl DashboardConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Load configuration following the resolution priority order:
    /// 1. Command-line `--config` path (highest priority)
    /// 2. `LIMA_CONFIG` environment variable
    /// 3. `<config_dir>/lima/config.toml`
    /// 4. Compiled defaults (fallback)
    ///
    /// A missing file is not fatal: a warning is logged and defaults are
    /// used. A file that exists but does not parse is an error. Environment
    /// overrides are applied last.
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_arg) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                let content = std::fs::read_to_string(&path)?;
                Self::from_toml_str(&content)?
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                debug!("No config file location available, using compiled defaults");
                Self::default()
            }
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LIMA_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("LIMA_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Ok(level) = std::env::var("LIMA_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(raw) = std::env::var("LIMA_NOTIFICATION_DURATION_MS") {
            self.notification_duration_ms = raw.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "LIMA_NOTIFICATION_DURATION_MS must be an integer, got {:?}",
                    raw
                ))
            })?;
        }
        if let Ok(raw) = std::env::var("LIMA_PROFILE_TIMEOUT_MS") {
            self.profile_timeout_ms = raw.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "LIMA_PROFILE_TIMEOUT_MS must be an integer, got {:?}",
                    raw
                ))
            })?;
        }
        if let Ok(path) = std::env::var("LIMA_SEED_FILE") {
            self.seed_file = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.event_bus_capacity == 0 {
            return Err(Error::Config("event_bus_capacity must be at least 1".to_string()));
        }
        if self.fallback_id_len == 0 {
            return Err(Error::Config("fallback_id_len must be at least 1".to_string()));
        }
        if self.profile_timeout_ms == 0 {
            return Err(Error::Config("profile_timeout_ms must be at least 1".to_string()));
        }
        if self.bind_addr.trim().is_empty() {
            return Err(Error::Config("bind_addr must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.notification_duration_ms)
    }

    pub fn profile_timeout(&self) -> Duration {
        Duration::from_millis(self.profile_timeout_ms)
    }
}

/// Resolve which config file to read, without checking it exists
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    default_config_path()
}

/// Platform config location: `~/.config/lima/config.toml` on Linux
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lima").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DashboardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.notification_duration(), Duration::from_secs(5));
        assert_eq!(config.fallback_id_len, 8);
        assert_eq!(config.profile_timeout(), Duration::from_secs(1));
        assert!(config.seed_file.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DashboardConfig::from_toml_str("notification_duration_ms = 8000\n").unwrap();
        assert_eq!(config.notification_duration_ms, 8000);
        assert_eq!(config.bind_addr, "127.0.0.1:5760");
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = DashboardConfig::from_toml_str("notification_duration_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = DashboardConfig {
            event_bus_capacity: 0,
            ..DashboardConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_profile_timeout() {
        let config = DashboardConfig::from_toml_str("profile_timeout_ms = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_path_has_priority() {
        let path = PathBuf::from("/tmp/explicit-lima.toml");
        assert_eq!(resolve_config_path(Some(&path)), Some(path));
    }
}
