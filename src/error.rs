//! Error types for Switchboard

use thiserror::Error;

/// Result type alias for Switchboard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Switchboard
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Registry construction error (duplicate or invalid names)
    #[error("registry error: {0}")]
    Registry(String),

    /// Credential service error
    #[error("auth error: {0}")]
    Auth(String),

    /// Transport handle could not describe the call
    #[error("transport error: {0}")]
    Transport(String),

    /// Payload could not be decoded into a registered type
    #[error("decode error: {0}")]
    Decode(String),

    /// Explicit status code raised by a handler
    #[error("status code {0}")]
    Status(u16),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
