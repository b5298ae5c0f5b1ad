//! TOML configuration file I/O
//!
//! Handles loading and saving the notifier configuration to/from TOML files
//! in the user's configuration directory.

use crate::config::NotifierConfig;
use crate::error::{ConfigError, NotifierError};
use crate::login::reconnect::ReconnectionPolicy;
use crate::net::probe::ProbeConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Complete TOML configuration structure
///
/// Contains the login configuration plus the optional reconnection policy
/// and connectivity probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Login settings
    #[serde(rename = "notifier")]
    pub notifier: NotifierConfig,

    /// Reconnection policy settings (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnection: Option<ReconnectionPolicy>,

    /// Connectivity probe settings (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeConfig>,
}

impl TomlConfig {
    /// Create a new TOML configuration
    pub fn new(notifier: NotifierConfig) -> Self {
        Self {
            notifier,
            reconnection: None,
            probe: None,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, NotifierError> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => NotifierError::Config(ConfigError::LoadFailed {
                path: path.to_string_lossy().to_string(),
            }),
            _ => NotifierError::Config(ConfigError::IoError {
                message: format!("Failed to read config file: {}", e),
            }),
        })?;

        let config: TomlConfig = toml::from_str(&contents).map_err(|e| {
            NotifierError::Config(ConfigError::ValidationError {
                message: format!("Failed to parse config file: {}", e),
            })
        })?;

        config.validate()?;

        if let Some(ref policy) = config.reconnection {
            info!(
                "Loaded reconnection policy: base_interval={}s, backoff_multiplier={}, max_interval={}s, network_change_delay={}s",
                policy.base_interval_secs,
                policy.backoff_multiplier,
                policy.max_interval_secs,
                policy.network_change_delay_secs
            );
        } else {
            debug!("No reconnection policy specified in config, defaults will be used");
        }

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), NotifierError> {
        self.validate()?;

        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                NotifierError::Config(ConfigError::IoError {
                    message: format!("Failed to create config directory: {}", e),
                })
            })?;
        }

        std::fs::write(path, contents).map_err(|_| {
            NotifierError::Config(ConfigError::SaveFailed {
                path: path.to_string_lossy().to_string(),
            })
        })?;

        info!("Saved notifier configuration to {:?}", path);
        Ok(())
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), NotifierError> {
        self.notifier
            .validate()
            .map_err(|message| NotifierError::Config(ConfigError::ValidationError { message }))?;

        if let Some(ref policy) = self.reconnection {
            policy.validate().map_err(|e| {
                warn!("Reconnection policy validation failed: {}", e);
                NotifierError::Config(ConfigError::ValidationError {
                    message: format!("Invalid reconnection policy: {}", e),
                })
            })?;
        }

        if let Some(ref probe) = self.probe {
            probe.validate().map_err(|message| {
                NotifierError::Config(ConfigError::ValidationError {
                    message: format!("Invalid probe settings: {}", message),
                })
            })?;
        }

        Ok(())
    }

    /// Get the reconnection policy, or the default one
    pub fn reconnection_policy(&self) -> ReconnectionPolicy {
        self.reconnection.clone().unwrap_or_default()
    }

    /// Get the probe settings, or the default ones
    pub fn probe_config(&self) -> ProbeConfig {
        self.probe.clone().unwrap_or_default()
    }
}

/// Default configuration file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Get the default configuration directory
///
/// Returns ~/.config/notifier, or NOTIFIER_CONFIG_DIR if set
pub fn get_config_dir() -> Result<PathBuf, NotifierError> {
    if let Ok(config_dir) = std::env::var("NOTIFIER_CONFIG_DIR") {
        return Ok(PathBuf::from(config_dir));
    }

    let home = std::env::var("HOME").map_err(|_| {
        NotifierError::Config(ConfigError::IoError {
            message: "HOME environment variable not set".to_string(),
        })
    })?;

    Ok(PathBuf::from(home).join(".config").join("notifier"))
}

/// Get the default configuration file path
pub fn get_config_path() -> Result<PathBuf, NotifierError> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from the default TOML file
pub fn load_config() -> Result<TomlConfig, NotifierError> {
    let config_path = get_config_path()?;
    TomlConfig::from_file(&config_path)
}

/// Save configuration to the default TOML file
pub fn save_config(config: &TomlConfig) -> Result<(), NotifierError> {
    let config_path = get_config_path()?;
    config.to_file(&config_path)
}

/// Check if a configuration file exists
pub fn config_exists() -> Result<bool, NotifierError> {
    Ok(get_config_path()?.exists())
}
