//! Error types for telegraph-journal

use telegraph_core::MessageId;
use thiserror::Error;

/// Journal error type
#[derive(Debug, Error)]
pub enum Error {
    /// A recorded message is not available in the replayed session
    #[error("Message {id} not found in replayed session (entry {seq})")]
    MessageNotFound { seq: u64, id: MessageId },

    /// The recording does not cover every delivery from the start, as when
    /// `max_entries` trimmed it
    #[error("Journal is incomplete: expected entry {expected}, found entry {found}")]
    Incomplete { expected: u64, found: u64 },

    /// The replayed delivery differs from the recording
    #[error("Replay diverged at entry {seq}: {reason}")]
    Divergence { seq: u64, reason: String },

    /// Export error
    #[error("Export error: {0}")]
    ExportError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for journal operations
pub type Result<T> = std::result::Result<T, Error>;
