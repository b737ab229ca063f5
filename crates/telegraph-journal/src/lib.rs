//! Telegraph Journal - export and replay of recorded sessions
//!
//! This crate builds on `telegraph-core`'s journal to provide:
//!
//! - **Exporter**: Render a journal as JSON, RON or text
//! - **Replayer**: Re-run the recorded delivery order against a fresh
//!   session and report the first divergence
//!
//! # Example
//!
//! ```rust,ignore
//! use telegraph_core::{Journal, Runtime};
//! use telegraph_journal::{ExportFormat, Exporter, Replayer};
//!
//! let mut journal = Journal::new();
//! journal.start_recording();
//! runtime.start(&mut session);
//! while runtime.step_with_journal(&mut session, &mut journal).is_some() {}
//!
//! // Same document, fresh session: the run must repeat exactly
//! let mut replayer = Replayer::new(&journal);
//! replayer.replay_all(&mut fresh_session, &mut fresh_runtime)?;
//!
//! let text = Exporter::new(&journal).export(ExportFormat::Text)?;
//! ```

mod error;
mod exporter;
mod replayer;

pub use error::{Error, Result};
pub use exporter::{ExportFormat, Exporter};
pub use replayer::{ReplayState, Replayer};

// Re-export core journal types for convenience
pub use telegraph_core::{Journal, JournalConfig, JournalEntry, JournalStats};
