//! Error Handling
//!
//! Error type definitions used in gl-labeler

use thiserror::Error;

use crate::labels::BatchReport;

pub type Result<T> = std::result::Result<T, Error>;

/// Error types for gl-labeler
#[derive(Error, Debug)]
pub enum Error {
    #[error("'{pattern}' is not a valid regular expression: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("repository with path '{0}' was not found")]
    ProjectNotFound(String),

    #[error("GitLab API error ({status}): {message}")]
    GitLabApi { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Batch(BatchReport),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),

    #[error("Invalid repository format: {0} (expected 'group/repo')")]
    InvalidRepositoryFormat(String),

    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new configuration validation error
    pub fn config_validation<S: Into<String>>(message: S) -> Self {
        Error::ConfigValidation(message.into())
    }

    /// Whether project resolution came up empty
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ProjectNotFound(_))
    }

    /// Whether the error came from talking to the GitLab API
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::GitLabApi { .. } | Error::Http(_))
    }
}
