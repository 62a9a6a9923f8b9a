//! Configuration errors.

use gateway_core::GatewayError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File could not be parsed
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Offending path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// File extension is not yaml, yml, toml, or json
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// Configuration parsed but is inconsistent
    #[error("invalid configuration: {}", .problems.join("; "))]
    Invalid {
        /// Every problem found
        problems: Vec<String>,
    },
}

impl ConfigError {
    /// Build a validation error from a single problem
    #[must_use]
    pub fn invalid(problem: impl Into<String>) -> Self {
        Self::Invalid {
            problems: vec![problem.into()],
        }
    }
}

impl From<ConfigError> for GatewayError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}
