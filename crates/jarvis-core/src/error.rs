//! Error types for configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving the deployment configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Deployment root does not exist or is not a directory.
    #[error("deployment root not found: {0}")]
    RootNotFound(PathBuf),

    /// An environment override could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    /// `.env.local` exists but could not be loaded.
    #[error("failed to load {path}: {message}")]
    EnvFile { path: PathBuf, message: String },

    /// Current directory could not be determined.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
