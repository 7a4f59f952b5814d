//! TOML-based configuration for quarry.
//!
//! Entity schemas usually live next to the service that builds queries, so
//! they can be loaded from a config file (quarry.toml) instead of being
//! assembled in code.
//!
//! Example configuration:
//! ```toml
//! [printer]
//! pretty = false
//!
//! [request]
//! dataset = "events"
//! app_id = "my_service"
//! parent_api = "/api/0/events"
//!
//! [entities.events]
//! required_time_column = "timestamp"
//! columns = [
//!     { name = "project_id", required = true },
//!     { name = "event_id" },
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ast::entity::Entity;
use crate::ast::expr::is_valid_column_name;
use crate::ast::request::{Request, RequestQuery};
use crate::printer::Printer;
use crate::validation::EntityModel;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Entity not configured: {0}")]
    EntityNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Printer options.
    pub printer: PrinterSettings,

    /// Defaults for request envelopes.
    pub request: RequestSettings,

    /// Entity schemas by entity name.
    pub entities: HashMap<String, EntityModel>,
}

/// Printer configuration.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PrinterSettings {
    /// Print one clause per line.
    pub pretty: bool,
}

/// Request envelope defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestSettings {
    pub dataset: Option<String>,
    pub app_id: Option<String>,
    pub parent_api: Option<String>,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        tracing::debug!(path = %path.display(), "loading settings");
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and check settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUARRY_CONFIG`
    /// 2. `./quarry.toml`
    /// 3. `~/.config/quarry/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("QUARRY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("quarry.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("quarry").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        // Return defaults if no config file found
        Ok(Settings::default())
    }

    /// Entity names and column names must be usable in a query.
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (name, model) in &self.entities {
            Entity::new(name).map_err(|e| SettingsError::InvalidConfig(e.to_string()))?;

            let time = model.required_time_column.iter();
            for column in model.columns.iter().map(|c| &c.name).chain(time) {
                if !is_valid_column_name(column) {
                    return Err(SettingsError::InvalidConfig(format!(
                        "entity '{name}' has an invalid column name '{column}'"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn printer(&self) -> Printer {
        Printer::new(self.printer.pretty)
    }

    /// The schema configured for an entity.
    pub fn entity_model(&self, name: &str) -> Result<Arc<EntityModel>, SettingsError> {
        self.entities
            .get(name)
            .cloned()
            .map(Arc::new)
            .ok_or_else(|| SettingsError::EntityNotFound(name.to_string()))
    }

    /// An entity bound to its configured schema, ready for `Query::new`.
    pub fn entity(&self, name: &str) -> Result<Entity, SettingsError> {
        let model = self.entity_model(name)?;
        let entity = Entity::new(name).map_err(|e| SettingsError::InvalidConfig(e.to_string()))?;
        Ok(entity.with_data_model(model))
    }

    /// A request envelope filled in from the `[request]` table.
    pub fn request(&self, query: impl Into<RequestQuery>) -> Result<Request, SettingsError> {
        let dataset = self
            .request
            .dataset
            .as_deref()
            .ok_or_else(|| SettingsError::InvalidConfig("request.dataset is not set".to_string()))?;
        let app_id = self
            .request
            .app_id
            .as_deref()
            .ok_or_else(|| SettingsError::InvalidConfig("request.app_id is not set".to_string()))?;

        let request = Request::new(dataset, app_id, query);
        Ok(match &self.request.parent_api {
            Some(parent_api) => request.with_parent_api(parent_api),
            None => request,
        })
    }
}
