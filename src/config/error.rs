//! Configuration errors

use std::path::PathBuf;

pub type ConfigResult<T> = Result<T, ConfigurationError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Configuration file not found, searched: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    #[error("Failed to read configuration file {path}: {reason}")]
    FileReadError { path: String, reason: String },

    #[error("Invalid YAML in {path}: {reason}")]
    InvalidYaml { path: String, reason: String },

    #[error("Missing required field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigurationError {
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigFileNotFound { searched_paths }
    }

    pub fn file_read_error(path: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::FileReadError {
            path: path.into(),
            reason: error.to_string(),
        }
    }

    pub fn invalid_yaml(path: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::InvalidYaml {
            path: path.into(),
            reason: error.to_string(),
        }
    }

    pub fn missing_required_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
