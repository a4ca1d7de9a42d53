//! TOML Configuration File Support
//!
//! Named sender outputs for tools built on courier, read from
//! `~/.config/courier/courier.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [defaults]
//! timeout_ms = 1000
//! plugin = "push"
//!
//! [outputs.events]
//! plugin = "publisher"
//! connection_string = "tcp://*:5555"
//! high_water_mark = 1000
//! send_tick_ms = 1
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::{ConnectionInfo, Endpoint, DEFAULT_CONNECTION_STRING};
use crate::registry::SenderRegistry;
use crate::timeout::SendTimeout;

/// Timeout applied when nothing configures one
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Plugin used when nothing names one
pub const DEFAULT_PLUGIN: &str = "push";

/// Overrides the config file location
pub const CONFIG_PATH_ENV: &str = "COURIER_CONFIG";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[defaults]` section
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsToml {
    /// Send timeout in milliseconds (0 = non-blocking)
    pub timeout_ms: u64,
    /// Plugin for outputs that do not name one
    pub plugin: String,
}

impl Default for DefaultsToml {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            plugin: DEFAULT_PLUGIN.to_string(),
        }
    }
}

/// One `[outputs.<name>]` section
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputToml {
    /// Plugin name (falls back to `defaults.plugin`)
    #[serde(default)]
    pub plugin: Option<String>,
    /// Address to bind
    pub connection_string: String,
    /// Per-peer queue limit in messages
    #[serde(default)]
    pub high_water_mark: Option<usize>,
    /// Per-attempt wait in milliseconds
    #[serde(default)]
    pub send_tick_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierToml {
    /// Defaults section
    pub defaults: DefaultsToml,
    /// Named outputs
    pub outputs: BTreeMap<String, OutputToml>,
    /// File this was loaded from, if any
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

// =============================================================================
// Overrides and Resolution
// =============================================================================

/// Values supplied on top of the file, by the CLI or the environment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Plugin name
    pub plugin: Option<String>,
    /// Connection string
    pub connection_string: Option<String>,
    /// Send timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Read overrides from environment variables
    ///
    /// Environment variables:
    /// - `COURIER_PLUGIN`: plugin name
    /// - `COURIER_CONNECTION`: connection string
    /// - `COURIER_TIMEOUT_MS`: send timeout in ms (ignored if not a number)
    pub fn from_env() -> Self {
        Self {
            plugin: std::env::var("COURIER_PLUGIN").ok(),
            connection_string: std::env::var("COURIER_CONNECTION").ok(),
            timeout_ms: std::env::var("COURIER_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Fill unset values from `lower`
    #[must_use]
    pub fn or(self, lower: Self) -> Self {
        Self {
            plugin: self.plugin.or(lower.plugin),
            connection_string: self.connection_string.or(lower.connection_string),
            timeout_ms: self.timeout_ms.or(lower.timeout_ms),
        }
    }
}

/// Everything needed to build and drive one sender
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputSettings {
    /// Plugin to resolve
    pub plugin: String,
    /// Connection info to pass to `connect_for_sends`
    pub connection: ConnectionInfo,
    /// Timeout for each send
    pub timeout: SendTimeout,
}

impl CourierToml {
    /// Settings for `output` (or for no named output) after `overrides`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `output` is not configured.
    pub fn resolve(
        &self,
        output: Option<&str>,
        overrides: &ConfigOverrides,
    ) -> Result<OutputSettings, ConfigError> {
        let section = match output {
            Some(name) => Some(self.outputs.get(name).ok_or_else(|| {
                ConfigError::ValidationError(format!("no output named {name:?} is configured"))
            })?),
            None => None,
        };

        let plugin = overrides
            .plugin
            .clone()
            .or_else(|| section.and_then(|s| s.plugin.clone()))
            .unwrap_or_else(|| self.defaults.plugin.clone());

        let connection_string = overrides
            .connection_string
            .clone()
            .or_else(|| section.map(|s| s.connection_string.clone()))
            .unwrap_or_else(|| DEFAULT_CONNECTION_STRING.to_string());

        let timeout_ms = overrides.timeout_ms.unwrap_or(self.defaults.timeout_ms);

        Ok(OutputSettings {
            plugin,
            connection: ConnectionInfo {
                connection_string,
                high_water_mark: section.and_then(|s| s.high_water_mark),
                send_tick_ms: section.and_then(|s| s.send_tick_ms),
            },
            timeout: SendTimeout::from_millis(timeout_ms),
        })
    }

    /// Check every output against `registry`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for unknown plugins, empty or
    /// unparseable connection strings, and zero high-water marks.
    pub fn validate(&self, registry: &SenderRegistry) -> Result<(), ConfigError> {
        if !registry.contains(&self.defaults.plugin) {
            return Err(ConfigError::ValidationError(format!(
                "defaults.plugin: unknown plugin {:?}",
                self.defaults.plugin
            )));
        }

        for (name, output) in &self.outputs {
            let plugin = output.plugin.as_deref().unwrap_or(&self.defaults.plugin);
            if !registry.contains(plugin) {
                return Err(ConfigError::ValidationError(format!(
                    "outputs.{name}.plugin: unknown plugin {plugin:?}"
                )));
            }

            if output.connection_string.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "outputs.{name}.connection_string is empty"
                )));
            }
            output
                .connection_string
                .parse::<Endpoint>()
                .map_err(|e| ConfigError::ValidationError(format!("outputs.{name}: {e}")))?;

            if output.high_water_mark == Some(0) {
                return Err(ConfigError::ValidationError(format!(
                    "outputs.{name}.high_water_mark must be at least 1"
                )));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/courier/courier.toml` or
/// `~/.config/courier/courier.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("courier").join("courier.toml"))
}

/// Load configuration from `$COURIER_CONFIG` or the default path
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<CourierToml, ConfigError> {
    let path = std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .or_else(default_config_path);
    load_config_from_path(path.as_deref())
}

/// Load configuration from a specific path
///
/// `None`, or a path that does not exist, yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_from_path(path: Option<&Path>) -> Result<CourierToml, ConfigError> {
    let Some(path) = path.filter(|p| p.exists()) else {
        tracing::debug!("No config file found, using defaults");
        return Ok(CourierToml::default());
    };

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: CourierToml = toml::from_str(&content)?;
    config.source_path = Some(path.to_path_buf());

    tracing::debug!(path = %path.display(), outputs = config.outputs.len(), "Loaded config file");
    Ok(config)
}
