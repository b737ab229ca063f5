//! Runtime configuration
//!
//! Controls how rule failures resolve and bounds the work a single delivery
//! may do. Every field has a default, so a partial RON/JSON config file is
//! valid.

use crate::rule::{ErrorFallback, DEFAULT_MAX_DEPTH};
use serde::{Deserialize, Deserializer, Serialize};

/// Configuration for the step executor and rule compilation
///
/// # Example
///
/// ```
/// use telegraph_core::{ErrorFallback, RuntimeConfig};
///
/// let config = RuntimeConfig::default()
///     .with_error_fallback(ErrorFallback::CallerDefault)
///     .with_max_generated_per_delivery(16);
/// assert_eq!(config.error_fallback(), ErrorFallback::CallerDefault);
/// assert_eq!(config.max_generated_per_delivery(), Some(16));
/// assert_eq!(config.max_depth(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// What a rule resolves to when it fails while running
    error_fallback: ErrorFallback,
    /// Maximum syntactic nesting of a rule; deeper rules do not compile
    #[serde(deserialize_with = "at_least_one")]
    max_depth: usize,
    /// Cap on messages generated by one delivery (`None` = unlimited)
    max_generated_per_delivery: Option<usize>,
}

impl RuntimeConfig {
    /// Set the rule failure policy
    pub fn with_error_fallback(mut self, fallback: ErrorFallback) -> Self {
        self.error_fallback = fallback;
        self
    }

    /// Set the rule nesting limit (at least 1)
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Cap the number of messages one delivery may generate
    pub fn with_max_generated_per_delivery(mut self, max: usize) -> Self {
        self.max_generated_per_delivery = Some(max);
        self
    }

    /// Rule failure policy
    pub fn error_fallback(&self) -> ErrorFallback {
        self.error_fallback
    }

    /// Rule nesting limit
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Fan-out cap per delivery
    pub fn max_generated_per_delivery(&self) -> Option<usize> {
        self.max_generated_per_delivery
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            error_fallback: ErrorFallback::FirstBinding,
            max_depth: DEFAULT_MAX_DEPTH,
            max_generated_per_delivery: None,
        }
    }
}

fn at_least_one<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    Ok(usize::deserialize(deserializer)?.max(1))
}
