/// Configuration.
///
/// Loaded from an optional TOML file, then overridden from the environment
/// (`HOST`, `PORT`, `ROWMODEL_DATA`, `USER`). Every field has a default, so
/// an empty file is a valid configuration.
///
/// ```toml
/// [server]
/// port = 9000
///
/// [session]
/// status_column = "waiver"
/// business_keys = ["block", "x", "y"]
///
/// [session.tolerance]
/// decimals = 3
/// ```

use crate::columns::ColumnDefOptions;
use crate::error::ConfigError;
use crate::group::GroupOptions;
use crate::pipeline::{ViewOptions, DEFAULT_PAGE_SIZE};
use crate::propagation::{PropagationConfig, Tolerance, TreeMode, MAX_TOLERANCE_DECIMALS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "ROWMODEL_CONFIG";
/// Environment variable naming a dataset to load at start.
pub const DATA_ENV: &str = "ROWMODEL_DATA";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub status_column: String,
    pub audit_column: String,
    /// Name stamped into the audit column. Falls back to `$USER`.
    pub editor: Option<String>,
    pub business_keys: Vec<String>,
    pub superseded_marker: String,
    pub hide_superseded: bool,
    pub page_size: usize,
    pub editable_columns: Vec<String>,
    pub tree: Option<TreeMode>,
    pub tolerance: Tolerance,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            status_column: "waiver".to_string(),
            audit_column: "user".to_string(),
            editor: None,
            business_keys: Vec::new(),
            superseded_marker: ".".to_string(),
            hide_superseded: false,
            page_size: DEFAULT_PAGE_SIZE,
            editable_columns: Vec::new(),
            tree: None,
            tolerance: Tolerance::default(),
        }
    }
}

impl SessionConfig {
    pub fn editor_name(&self) -> &str {
        self.editor.as_deref().unwrap_or("unknown")
    }

    pub fn propagation(&self) -> PropagationConfig {
        PropagationConfig {
            status_column: self.status_column.clone(),
            audit_column: self.audit_column.clone(),
            editor: self.editor_name().to_string(),
            business_keys: self.business_keys.clone(),
            tolerance: self.tolerance,
            tree: self.tree.clone(),
        }
    }

    pub fn view_options(&self, hide_superseded: bool) -> ViewOptions {
        ViewOptions {
            group: GroupOptions {
                status_column: self.status_column.clone(),
                hide_superseded,
                superseded_marker: self.superseded_marker.clone(),
            },
            page_size: self.page_size,
        }
    }

    pub fn column_def_options(&self) -> ColumnDefOptions {
        ColumnDefOptions {
            status_column: self.status_column.clone(),
            editable_columns: self.editable_columns.clone(),
            hidden_columns: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that deserialize but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tolerance = &self.session.tolerance;
        if tolerance.decimals > MAX_TOLERANCE_DECIMALS {
            return Err(ConfigError::ToleranceDecimals {
                decimals: tolerance.decimals,
                max: MAX_TOLERANCE_DECIMALS,
            });
        }
        if !tolerance.epsilon.is_finite() || tolerance.epsilon < 0.0 {
            return Err(ConfigError::ToleranceEpsilon(tolerance.epsilon));
        }
        Ok(())
    }

    /// Read `path` when given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Config::default(),
        };
        config.apply_env_from(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(data) = lookup(DATA_ENV) {
            self.server.data_path = Some(PathBuf::from(data));
        }
        if self.session.editor.is_none() {
            self.session.editor = lookup("USER");
        }
        Ok(())
    }
}
