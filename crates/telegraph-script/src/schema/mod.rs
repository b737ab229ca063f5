//! Schema definitions for input documents
//!
//! Field names follow the document format (`initialState`,
//! `messageHandlers`, ...). Reading is lenient below the top level: bad
//! entries are skipped with a warning instead of failing the whole document.

pub mod engine;
pub mod message;

pub use engine::{EngineDef, HandlerDef};
pub use message::TemplateDef;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use telegraph_core::{RuntimeConfig, Session, Value};
use tracing::{debug, warn};

/// A parsed input document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    /// Engines in document order
    pub engines: Vec<EngineDef>,
}

impl Document {
    /// Read a document from a parsed value
    ///
    /// Fails only when there is no top-level `engines` array.
    pub fn from_value(value: &Value) -> Result<Self> {
        let engines = value
            .get("engines")
            .ok_or_else(|| Error::InvalidDocument("missing top-level `engines` array".into()))?;
        let Some(entries) = engines.as_list() else {
            return Err(Error::InvalidDocument(format!(
                "`engines` must be an array, found {}",
                engines.type_name()
            )));
        };

        let engines = entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| EngineDef::from_value(index, entry))
            .collect();
        Ok(Self { engines })
    }

    /// Get an engine definition by name (the last one wins on duplicates)
    pub fn engine(&self, name: &str) -> Option<&EngineDef> {
        self.engines.iter().rev().find(|engine| engine.name == name)
    }

    /// Build a session with every engine registered
    ///
    /// Call `Runtime::start` on the result to enqueue initial messages.
    pub fn into_session(self, config: &RuntimeConfig) -> Session {
        let mut session = Session::new();
        for def in &self.engines {
            if let Err(error) = session.register_engine(def.compile(config.max_depth())) {
                warn!(engine = %def.name, %error, "could not register engine");
            }
        }
        debug!(engines = session.engines().len(), "session built");
        session
    }
}
