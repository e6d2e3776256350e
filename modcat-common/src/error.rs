//! Common error types for modcat

use thiserror::Error;

/// Common result type for modcat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the catalog tooling
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation error for records or the catalog index
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialise error
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Name could not be turned into a catalog slug
    #[error("Invalid identifier: {0:?} normalises to an empty slug")]
    InvalidIdentifier(String),

    /// Internal invariant violated
    #[error("Internal error: {0}")]
    Internal(String),
}
