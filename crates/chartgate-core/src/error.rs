//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{field} is required")]
    MissingField { field: String },

    #[error("Invalid {field} '{value}': {reason}")]
    InvalidField {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid credential bundle: {message}")]
    InvalidCredentials { message: String },

    #[error("Failed to parse package manager response: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

impl CoreError {
    /// Create a missing-field error
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Whether this error describes a bad request rather than a bad response
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingField { .. } | Self::InvalidField { .. })
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
