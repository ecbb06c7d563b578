//! Reader configuration.
//!
//! A controller is configured from a TOML file. When no file is given, or the
//! given file does not exist, the configuration embedded in the crate
//! (`props/default.toml`) is used instead.
//!
//! Every scalar in the file is also exposed as a flat parameter, keyed by its
//! dotted path (`connector.host`, `epc_transponder_model.tid_size`, ...).
//! Arrays are joined with commas.
//!
//! # Example
//!
//! ```toml
//! id_type = "EPC"
//! read_points = ["reader-1"]
//!
//! [connector]
//! host = "192.168.0.20"
//! port = 1000
//! auto_reconnect = true
//! reconnect_delay_ms = 1000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use caenlink_network::{ConnectorConfig, DEFAULT_PORT, DEFAULT_RECONNECT_DELAY};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{HalError, Result};
use crate::types::{EpcTransponderModel, IdType};

/// Configuration embedded in the crate.
pub const DEFAULT_CONFIG: &str = include_str!("../props/default.toml");

/// Where a configuration was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Loaded from a file on disk.
    File(PathBuf),

    /// Embedded default configuration.
    Embedded,

    /// Parsed from a string.
    Inline,
}

/// Connection section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorSettings {
    pub host: String,
    pub port: u16,
    pub auto_reconnect: bool,
    pub reconnect_delay_ms: u64,
    pub max_line_length: Option<usize>,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            auto_reconnect: true,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            max_line_length: None,
        }
    }
}

impl From<&ConnectorSettings> for ConnectorConfig {
    fn from(settings: &ConnectorSettings) -> Self {
        let mut config =
            ConnectorConfig::new(settings.host.clone(), settings.port, settings.auto_reconnect);
        config.reconnect_delay = Duration::from_millis(settings.reconnect_delay_ms);
        config.max_line_length = settings.max_line_length;
        config
    }
}

/// Typed view of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Connection to the reader.
    pub connector: ConnectorSettings,

    /// Read point names. Empty means a single read point named after the
    /// reader address.
    pub read_points: Vec<String>,

    /// Identifier type reported in tag descriptors.
    pub id_type: String,

    /// Memory model used for EPC Class 1 Gen 2 tags.
    pub epc_transponder_model: EpcTransponderModel,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            connector: ConnectorSettings::default(),
            read_points: Vec::new(),
            id_type: "EPC".to_string(),
            epc_transponder_model: EpcTransponderModel::default(),
        }
    }
}

/// Loaded reader configuration.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    settings: ControllerSettings,
    parameters: BTreeMap<String, String>,
    source: ConfigSource,
}

impl ReaderConfig {
    /// Load the configuration from `path`.
    ///
    /// Falls back to the embedded configuration when `path` is `None` or
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Configuration`] if the file cannot be read or
    /// is not a valid configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "Loading reader configuration");
                let text = std::fs::read_to_string(path).map_err(|e| {
                    HalError::configuration(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::parse(&text, ConfigSource::File(path.to_path_buf()))
            }
            Some(path) => {
                warn!(
                    path = %path.display(),
                    "Configuration file not found, using embedded defaults"
                );
                Self::embedded()
            }
            None => {
                debug!("No configuration file given, using embedded defaults");
                Self::embedded()
            }
        }
    }

    /// Load the embedded configuration.
    pub fn embedded() -> Result<Self> {
        Self::parse(DEFAULT_CONFIG, ConfigSource::Embedded)
    }

    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Configuration`] if the text is not valid.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::parse(text, ConfigSource::Inline)
    }

    fn parse(text: &str, source: ConfigSource) -> Result<Self> {
        let table: toml::Table =
            toml::from_str(text).map_err(|e| HalError::configuration(e.to_string()))?;
        let settings: ControllerSettings =
            toml::from_str(text).map_err(|e| HalError::configuration(e.to_string()))?;

        if settings.connector.host.trim().is_empty() {
            return Err(HalError::configuration("connector.host must not be empty"));
        }
        if settings.connector.port == 0 {
            return Err(HalError::configuration("connector.port must not be 0"));
        }

        let mut parameters = BTreeMap::new();
        flatten("", &table, &mut parameters);

        Ok(Self {
            settings,
            parameters,
            source,
        })
    }

    /// Load this configuration again from its source.
    ///
    /// Configurations that did not come from a file are returned unchanged.
    pub fn reload(&self) -> Result<Self> {
        match &self.source {
            ConfigSource::File(path) => Self::load(Some(path.as_path())),
            ConfigSource::Embedded | ConfigSource::Inline => Ok(self.clone()),
        }
    }

    /// Get the typed settings.
    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Get where this configuration was loaded from.
    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// Build the connector configuration.
    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig::from(&self.settings.connector)
    }

    /// Get the identifier type for tag descriptors.
    pub fn id_type(&self) -> IdType {
        IdType::new(self.settings.id_type.clone())
    }

    /// Get a parameter value by dotted name.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Get all parameter names, sorted.
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.keys().cloned().collect()
    }
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            toml::Value::Table(inner) => flatten(&name, inner, out),
            other => {
                out.insert(name, scalar(other));
            }
        }
    }
}

fn scalar(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}
