//! Configuration module for quarry.
//!
//! Handles printer options, request defaults and entity schemas.

mod settings;

pub use settings::{PrinterSettings, RequestSettings, Settings, SettingsError};
