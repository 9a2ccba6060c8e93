//! Error types for fieldsafe-core

use thiserror::Error;

use crate::types::EventKind;

/// Main error type for the fieldsafe-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP failure (connect, timeout, body)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The endpoint refused or failed to accept an event
    #[error("delivery of {kind} event failed: {message}")]
    Delivery { kind: EventKind, message: String },

    /// Payload rejected before submission
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Result type alias for fieldsafe-core
pub type Result<T> = std::result::Result<T, Error>;
