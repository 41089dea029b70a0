// src/error.rs

//! Error types for the repository query engine

use thiserror::Error;

/// Errors raised by the library
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed atom, dependency expression or version string
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Not found: {0}")]
    NotFoundError(String),

    /// A record with the same identity already exists
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Malformed or unsupported treeupdates directive
    #[error("Invalid directive: {0}")]
    InvalidDirective(String),

    /// A repository plugin hook refused an operation
    #[error("Plugin '{plugin}' failed: {message}")]
    PluginError { plugin: String, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
