//! genwg Error Types

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for genwg operations
pub type Result<T> = std::result::Result<T, Error>;

/// A single finding reported by the validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Location of the offending field, e.g. `servers[0].clients[1].bind`
    pub path: String,
    /// What is wrong with it
    pub reason: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// genwg error types
#[derive(Error, Debug)]
pub enum Error {
    // Structural errors
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    // Validation errors
    #[error("Validation failed with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    // Derivation errors
    #[error("{entity}: {reason}")]
    Derivation { entity: String, reason: String },

    // Consistency errors
    #[error("{entity}: {reason}")]
    Consistency { entity: String, reason: String },

    // External tool errors
    #[error("Key provider failed: {0}")]
    KeyProvider(String),

    // Output errors
    #[error("Output directory {0} already exists (use --force to replace it)")]
    OutputExists(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    YamlSer(#[from] serde_yaml::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    pub(crate) fn derivation(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Derivation {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn consistency(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Consistency {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Name of the error class, used as a prefix in diagnostics
    pub fn category(&self) -> &'static str {
        match self {
            Error::NotFound(_) | Error::Parse { .. } => "structural",
            Error::Validation(_) => "validation",
            Error::Derivation { .. } => "derivation",
            Error::Consistency { .. } => "consistency",
            Error::KeyProvider(_) => "external tool",
            Error::OutputExists(_)
            | Error::Io(_)
            | Error::YamlSer(_)
            | Error::TomlSer(_) => "output",
        }
    }

    /// Validation findings carried by this error, if any
    pub fn findings(&self) -> &[ValidationError] {
        match self {
            Error::Validation(findings) => findings,
            _ => &[],
        }
    }
}
