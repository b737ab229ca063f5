//! Error types for telegraph-core

use thiserror::Error;

/// Core error type
///
/// Only registry operations surface these; failures inside rule evaluation
/// and message delivery are recovered and logged instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Engine name must not be empty")]
    EmptyEngineName,

    #[error("Engine not found: {0}")]
    EngineNotFound(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
