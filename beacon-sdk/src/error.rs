//! Error types for beacon-sdk

use thiserror::Error;

/// Main error type for the beacon-sdk library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Durable state backend error
    #[error("state store error: {0}")]
    State(String),

    /// Transport setup error
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for beacon-sdk
pub type Result<T> = std::result::Result<T, Error>;
