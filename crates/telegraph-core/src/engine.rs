//! Engines and the registry that owns them
//!
//! An engine is a named state machine: a JSON-like state value plus an
//! ordered list of handlers. Handlers are data (rule strings), so the whole
//! topology comes from the input document.

use crate::rule::{Context, ErrorFallback, Rule};
use crate::{Error, Result, Value};
use indexmap::IndexMap;
use std::fmt;
use tracing::{debug, warn};

/// Destination of a generated message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A named engine
    Engine(String),
    /// Whoever sent the triggering message (`"from"` in documents)
    Sender,
}

impl Target {
    /// The keyword that addresses the sender of the triggering message
    pub const SENDER: &'static str = "from";

    /// Parse a document target; `"from"` addresses the sender
    pub fn parse(target: &str) -> Self {
        if target == Self::SENDER {
            Target::Sender
        } else {
            Target::Engine(target.to_string())
        }
    }

    /// Resolve to an engine name given the triggering message's sender
    pub fn resolve<'a>(&'a self, sender: &'a str) -> &'a str {
        match self {
            Target::Engine(name) => name,
            Target::Sender => sender,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Engine(name) => write!(f, "{}", name),
            Target::Sender => write!(f, "{}", Self::SENDER),
        }
    }
}

/// Payload of a message template
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Used as-is
    Literal(Value),
    /// Evaluated against `{ state }` of the generating engine
    Rule(Rule),
}

impl Payload {
    /// Build a payload from a document value: strings are rules, anything
    /// else is a literal
    pub fn from_value(value: Value, max_depth: usize) -> Self {
        match value {
            Value::String(source) => Payload::Rule(Rule::with_max_depth(source, max_depth)),
            other => Payload::Literal(other),
        }
    }

    /// Produce the payload value for an engine whose current state is `state`
    ///
    /// A rule that yields no value resolves to `null`.
    pub fn resolve(&self, state: &Value, fallback: ErrorFallback) -> Value {
        match self {
            Payload::Literal(value) => value.clone(),
            Payload::Rule(rule) => {
                let ctx = Context::new().with("state", state.clone());
                rule.evaluate(&ctx, Some(Value::Null), fallback)
                    .unwrap_or(Value::Null)
            }
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Literal(Value::Null)
    }
}

/// A message an engine emits, before its target and payload are resolved
///
/// `to` and `kind` are optional because documents may omit them; a template
/// missing either is skipped when messages are generated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageTemplate {
    pub to: Option<Target>,
    pub kind: Option<String>,
    pub payload: Payload,
}

impl MessageTemplate {
    /// Create a complete template
    pub fn new(to: Target, kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            to: Some(to),
            kind: Some(kind.into()),
            payload,
        }
    }

    /// Target and message type, if both are present and non-empty
    pub fn route(&self) -> Option<(&Target, &str)> {
        let to = self.to.as_ref()?;
        if matches!(to, Target::Engine(name) if name.is_empty()) {
            return None;
        }
        let kind = self.kind.as_deref().filter(|kind| !kind.is_empty())?;
        Some((to, kind))
    }
}

/// Reaction of an engine to incoming messages
///
/// A handler with an empty guard never matches.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Handler {
    /// Predicate over `{ state, payload, from, messageType }`
    pub guard: Rule,
    /// New state computed from `{ state, payload, from }`
    pub state_effect: Rule,
    /// Messages emitted while the guard holds
    pub generate: Vec<MessageTemplate>,
}

impl Handler {
    /// Create a handler with a guard and nothing else
    pub fn new(guard: impl Into<Rule>) -> Self {
        Self {
            guard: guard.into(),
            ..Default::default()
        }
    }

    /// Set the state effect (builder style)
    pub fn with_effect(mut self, effect: impl Into<Rule>) -> Self {
        self.state_effect = effect.into();
        self
    }

    /// Append a generated message (builder style)
    pub fn with_message(mut self, template: MessageTemplate) -> Self {
        self.generate.push(template);
        self
    }
}

/// A named state machine
#[derive(Debug, Clone, PartialEq)]
pub struct Engine {
    name: String,
    /// Current state
    pub state: Value,
    handlers: Vec<Handler>,
    initial_messages: Vec<MessageTemplate>,
}

impl Engine {
    /// Create an engine; the name must be non-empty to be registered
    pub fn new(name: impl Into<String>, initial_state: Value, handlers: Vec<Handler>) -> Self {
        Self {
            name: name.into(),
            state: initial_state,
            handlers,
            initial_messages: Vec::new(),
        }
    }

    /// Set the messages enqueued when the session starts (builder style)
    pub fn with_initial_messages(mut self, messages: Vec<MessageTemplate>) -> Self {
        self.initial_messages = messages;
        self
    }

    /// Engine name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handlers in evaluation order
    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    /// Messages enqueued when the session starts
    pub fn initial_messages(&self) -> &[MessageTemplate] {
        &self.initial_messages
    }

    /// Index of the first handler whose guard holds in `ctx`
    pub fn matching_handler(&self, ctx: &Context, fallback: ErrorFallback) -> Option<usize> {
        self.handlers
            .iter()
            .position(|handler| handler.guard.test(ctx, fallback))
    }
}

/// Storage for all engines of a session, keyed by name in registration order
#[derive(Debug, Clone, Default)]
pub struct EngineRegistry {
    engines: IndexMap<String, Engine>,
}

impl EngineRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new engine
    ///
    /// An existing engine with the same name is replaced in place, keeping
    /// its registration position.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        initial_state: Value,
        handlers: Vec<Handler>,
    ) -> Result<&Engine> {
        self.register_engine(Engine::new(name, initial_state, handlers))
    }

    /// Register a fully built engine
    pub fn register_engine(&mut self, engine: Engine) -> Result<&Engine> {
        if engine.name.is_empty() {
            warn!("refusing to register an engine without a name");
            return Err(Error::EmptyEngineName);
        }
        let name = engine.name.clone();
        if self.engines.insert(name.clone(), engine).is_some() {
            warn!(engine = %name, "engine registered twice, replacing the earlier definition");
        } else {
            debug!(engine = %name, "engine registered");
        }
        self.engines
            .get(&name)
            .ok_or(Error::EngineNotFound(name))
    }

    /// Get an engine by name
    pub fn get(&self, name: &str) -> Option<&Engine> {
        self.engines.get(name)
    }

    /// Get a mutable reference to an engine
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Engine> {
        self.engines.get_mut(name)
    }

    /// Replace an engine's state, returning the previous one
    pub fn set_state(&mut self, name: &str, state: Value) -> Result<Value> {
        let engine = self
            .engines
            .get_mut(name)
            .ok_or_else(|| Error::EngineNotFound(name.to_string()))?;
        Ok(std::mem::replace(&mut engine.state, state))
    }

    /// Check if an engine is registered
    pub fn contains(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    /// All engines in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Engine> {
        self.engines.values()
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    /// Every engine's current state, keyed by name
    pub fn states(&self) -> IndexMap<String, Value> {
        self.engines
            .iter()
            .map(|(name, engine)| (name.clone(), engine.state.clone()))
            .collect()
    }

    /// Get the number of engines
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
