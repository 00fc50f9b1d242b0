//! TOML configuration for the `boks` tool and for applications embedding the
//! client.
//!
//! The default location is platform specific:
//! - Windows:  `%APPDATA%\Boks\config.toml`
//! - Linux:    `~/.config/boks/config.toml`
//! - macOS:    `~/Library/Application Support/Boks/config.toml`
//!
//! # Example
//!
//! ```toml
//! [client]
//! command_timeout_ms = 5000
//! history_timeout_ms = 2000
//! wait_timeout_ms = 5000
//! log_level = "info"
//!
//! [device]
//! config_key = "AABBCCDD"
//! master_key = "00112233445566778899AABBCCDDEEFF00112233445566778899AABBCCDDEEFF"
//! ```
//!
//! Every field is optional: missing fields take the defaults shown above and
//! the `[device]` values stay unset.  The device credentials are validated on
//! load, so a typo surfaces immediately rather than at the first command.

use std::path::{Path, PathBuf};
use std::time::Duration;

use boks_core::protocol::validation::{ConfigKey, Seed};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::client::ClientTimeouts;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The file parsed but holds a value the device would reject.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default)]
    pub client: ClientSettings,
    #[serde(default)]
    pub device: DeviceSettings,
}

/// Timeouts and logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientSettings {
    /// Whole-exchange timeout for ordinary commands.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Maximum gap between packets while downloading history.
    #[serde(default = "default_history_timeout_ms")]
    pub history_timeout_ms: u64,
    /// Timeout for waiting on a single unsolicited packet.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Credentials for one box.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSettings {
    /// 8 upper-case hex characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_key: Option<String>,
    /// 64 hex characters (32 bytes); the PIN derivation key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_key: Option<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_command_timeout_ms() -> u64 {
    5000
}
fn default_history_timeout_ms() -> u64 {
    2000
}
fn default_wait_timeout_ms() -> u64 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            command_timeout_ms: default_command_timeout_ms(),
            history_timeout_ms: default_history_timeout_ms(),
            wait_timeout_ms: default_wait_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

// ── Accessors and validation ─────────────────────────────────────────────────

impl ClientConfig {
    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML, [`ConfigError::Invalid`]
    /// for out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks that timeouts are non-zero and device credentials are well formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("command_timeout_ms", self.client.command_timeout_ms),
            ("history_timeout_ms", self.client.history_timeout_ms),
            ("wait_timeout_ms", self.client.wait_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Invalid(format!("client.{name} must be non-zero")));
        }
        self.config_key()?;
        self.master_key()?;
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.client.command_timeout_ms)
    }

    pub fn history_timeout(&self) -> Duration {
        Duration::from_millis(self.client.history_timeout_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.client.wait_timeout_ms)
    }

    /// The client timeouts described by this file.
    pub fn timeouts(&self) -> ClientTimeouts {
        ClientTimeouts {
            command: self.command_timeout(),
            history: self.history_timeout(),
            wait: self.wait_timeout(),
        }
    }

    /// The validated config key, if one is configured.
    pub fn config_key(&self) -> Result<Option<ConfigKey>, ConfigError> {
        self.device
            .config_key
            .as_deref()
            .map(ConfigKey::new)
            .transpose()
            .map_err(|e| ConfigError::Invalid(format!("device.config_key: {e}")))
    }

    /// The validated master key, if one is configured.
    pub fn master_key(&self) -> Result<Option<Seed>, ConfigError> {
        self.device
            .master_key
            .as_deref()
            .map(Seed::from_hex)
            .transpose()
            .map_err(|e| ConfigError::Invalid(format!("device.master_key: {e}")))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config at `path`, returning the defaults if the file does not
/// exist.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] or [`ConfigError::Invalid`] for bad content.
pub fn load_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => ClientConfig::from_toml_str(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
pub fn save_to(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = config.to_toml_string()?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Boks"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("boks"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Boks")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const MASTER_KEY: &str = "00112233445566778899AABBCCDDEEFF00112233445566778899AABBCCDDEEFF";

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("boks-config-{}", Uuid::new_v4()))
            .join("config.toml")
    }

    #[test]
    fn test_default_timeouts() {
        // Arrange / Act
        let cfg = ClientConfig::default();

        // Assert
        assert_eq!(cfg.command_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.history_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.wait_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.client.log_level, "info");
        assert_eq!(cfg.timeouts(), ClientTimeouts::default());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn test_partial_file_fills_missing_fields() {
        let cfg = ClientConfig::from_toml_str(
            r#"
            [client]
            history_timeout_ms = 3500

            [device]
            config_key = "AABBCCDD"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.history_timeout(), Duration::from_millis(3500));
        assert_eq!(cfg.client.command_timeout_ms, 5000);
        assert_eq!(cfg.config_key().unwrap().unwrap().as_str(), "AABBCCDD");
        assert!(cfg.master_key().unwrap().is_none());
    }

    #[test]
    fn test_invalid_config_key_is_rejected_on_load() {
        let err = ClientConfig::from_toml_str("[device]\nconfig_key = \"aabbccdd\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("config_key")));
    }

    #[test]
    fn test_short_master_key_is_rejected_on_load() {
        let err = ClientConfig::from_toml_str("[device]\nmaster_key = \"0011\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("master_key")));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = ClientConfig::from_toml_str("[client]\nwait_timeout_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("wait_timeout_ms"));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let err = ClientConfig::from_toml_str("[client\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        // Arrange
        let path = scratch_path();
        let mut cfg = ClientConfig::default();
        cfg.client.command_timeout_ms = 8000;
        cfg.device.config_key = Some("0123ABCD".into());
        cfg.device.master_key = Some(MASTER_KEY.into());

        // Act
        save_to(&path, &cfg).unwrap();
        let restored = load_from(&path).unwrap();

        // Assert
        assert_eq!(restored, cfg);
        assert_eq!(restored.master_key().unwrap().unwrap().as_bytes()[1], 0x11);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let cfg = load_from(&scratch_path()).unwrap();
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn test_unset_device_fields_are_not_serialized() {
        let text = ClientConfig::default().to_toml_string().unwrap();
        assert!(text.contains("[client]"));
        assert!(!text.contains("config_key"));
    }
}
