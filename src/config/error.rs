//! Errors raised while loading and validating configuration.

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field is present but holds an unusable value.
    #[error("invalid {field}: {message}")]
    Invalid {
        /// Offending configuration key.
        field: String,
        /// Human-readable explanation.
        message: String,
    },
    /// Indicates two mutually exclusive options were both supplied.
    #[error("conflicting configuration: {0}")]
    Conflict(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Classifies the error; every variant is a static precondition failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::ConfigurationInvalid
    }
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
