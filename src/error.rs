use crate::sources::SourceKind;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Ferret
#[derive(Error, Debug)]
pub enum FerretError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Malformed query input; nothing was executed
    #[error("Invalid query: {errors:?}")]
    InvalidQuery { errors: Vec<ValidationError> },

    /// A string could not be parsed into one of the crate's enums
    #[error("Unknown {kind}: '{value}'")]
    UnknownValue { kind: &'static str, value: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Internal failure inside a source executor
    #[error("Source {source_kind} failed: {message}")]
    Source {
        source_kind: SourceKind,
        message: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FerretError {
    /// Shorthand for a single-field query validation failure
    pub fn invalid_query(path: impl Into<String>, message: impl Into<String>) -> Self {
        FerretError::InvalidQuery {
            errors: vec![ValidationError::new(path, message)],
        }
    }

    /// Shorthand for a source-internal failure
    pub fn source(source_kind: SourceKind, message: impl Into<String>) -> Self {
        FerretError::Source {
            source_kind,
            message: message.into(),
        }
    }
}

/// Validation error for configuration keys and query fields
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Path to the key or field that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Result type for Ferret operations
pub type Result<T> = std::result::Result<T, FerretError>;
