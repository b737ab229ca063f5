//! Telegraph Script - input document schema and loader
//!
//! Loads engine topologies from JSON or RON documents:
//! - Engine definitions with initial state
//! - Message handlers (guard, state effect, generated messages)
//! - Initial messages enqueued when a session starts

mod error;
mod loader;
mod schema;

pub use error::{Error, Result};
pub use loader::Loader;
pub use schema::{Document, EngineDef, HandlerDef, TemplateDef};
