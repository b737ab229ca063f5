//! Error types for telegraph-script

use thiserror::Error;

/// Document loading error type
///
/// Every variant is fatal: no session is built from a document that fails
/// to load.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
