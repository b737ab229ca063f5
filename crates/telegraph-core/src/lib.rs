//! Telegraph Core - message-passing simulation of interacting engines
//!
//! This crate provides the core types and executor:
//! - Dynamic value type (`Value`, `ValueMap`)
//! - Rule interpreter for guards, state effects and payload generators
//! - Engine registry and message queue
//! - Session state and the step executor (`Runtime`)
//!
//! ## Model
//!
//! Engines are named state machines whose behaviour is data: each handler
//! holds rule strings evaluated against the engine's state and the incoming
//! message. Delivering a message may replace the engine's state and enqueue
//! new messages; the presentation layer decides when each enqueued message
//! is delivered.
//!
//! ## Journal Feature
//!
//! Enable the `journal` feature to record deliveries for export and replay:
//! ```toml
//! telegraph-core = { version = "0.1", features = ["journal"] }
//! ```

mod config;
pub mod engine;
mod error;
mod identity;
mod msg;
pub mod rule;
pub mod runtime;
mod session;
mod value;

#[cfg(feature = "journal")]
pub mod journal;

pub use config::RuntimeConfig;
pub use engine::{Engine, EngineRegistry, Handler, MessageTemplate, Payload, Target};
pub use error::{Error, Result};
pub use identity::MessageId;
pub use msg::{dedupe, Message, MessageQueue};
pub use rule::{evaluate, Context, ErrorFallback, Rule};
pub use runtime::{Delivery, DeliveryOutcome, Runtime, SessionObserver};
pub use session::Session;
pub use value::{Value, ValueMap};

#[cfg(feature = "journal")]
pub use journal::{Journal, JournalConfig, JournalEntry, JournalStats};
