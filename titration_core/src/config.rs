//! Configuration file support for `titrate`.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/titrate/config.toml`.

use crate::{catalog, protocol, Error, Protocol, Result, TopStepPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub titration: TitrationConfig,
}

/// Which protocol to evaluate against
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ProtocolConfig {
    /// Protocol file; the built-in protocol is used when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Titration behaviour overrides
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TitrationConfig {
    /// Overrides the protocol's top-step policy when set
    #[serde(default)]
    pub top_step: Option<TopStepPolicy>,
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("titrate").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Load the protocol to titrate against.
    ///
    /// `path_override` wins over the configured path; with neither, the
    /// built-in protocol is used. The configured top-step policy is applied
    /// on top.
    pub fn resolve_protocol(&self, path_override: Option<&Path>) -> Result<Protocol> {
        let mut protocol = match path_override.or(self.protocol.path.as_deref()) {
            Some(path) => protocol::load_protocol(path)?,
            None => catalog::get_default_protocol()?.clone(),
        };

        if let Some(policy) = self.titration.top_step {
            protocol.top_step = policy;
        }
        Ok(protocol)
    }
}
