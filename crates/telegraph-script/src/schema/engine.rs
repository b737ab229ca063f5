//! Engine and handler schema

use super::message::{string_field, templates_from, TemplateDef};
use serde::{Deserialize, Serialize};
use telegraph_core::{Engine, Handler, Rule, Value};
use tracing::warn;

/// Definition of an engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineDef {
    /// Unique, non-empty name
    pub name: String,
    /// State before any delivery
    #[serde(default)]
    pub initial_state: Value,
    /// Handlers in evaluation order
    #[serde(default)]
    pub message_handlers: Vec<HandlerDef>,
    /// Messages enqueued when the session starts
    #[serde(default)]
    pub initial_messages: Vec<TemplateDef>,
}

/// Definition of a message handler
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerDef {
    /// Rule deciding whether the handler applies; absent means never
    #[serde(default)]
    pub guard: Option<String>,
    /// Rule computing the new state
    #[serde(default)]
    pub state_effect: Option<String>,
    /// Messages emitted while the guard holds
    #[serde(default)]
    pub generate_messages: Vec<TemplateDef>,
}

impl EngineDef {
    /// Read an engine from a document value
    ///
    /// Returns `None` (with a warning) when the entry has no usable name.
    pub(crate) fn from_value(index: usize, value: &Value) -> Option<Self> {
        let Some(fields) = value.as_map() else {
            warn!(index, found = value.type_name(), "engine entry is not an object, skipping");
            return None;
        };
        let name = match fields.get("name") {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            _ => {
                warn!(index, "engine entry has no name, skipping");
                return None;
            }
        };

        let message_handlers = match fields.get("messageHandlers") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|item| HandlerDef::from_value(&name, item))
                .collect(),
            Some(other) => {
                warn!(engine = %name, found = other.type_name(), "messageHandlers is not an array, ignoring");
                Vec::new()
            }
        };

        Some(Self {
            initial_state: fields.get("initialState").cloned().unwrap_or_default(),
            message_handlers,
            initial_messages: templates_from(fields.get("initialMessages"), "initialMessages"),
            name,
        })
    }

    /// Compile into a core engine
    pub fn compile(&self, max_depth: usize) -> Engine {
        let handlers = self
            .message_handlers
            .iter()
            .map(|handler| handler.compile(max_depth))
            .collect();
        let initial_messages = self
            .initial_messages
            .iter()
            .map(|template| template.compile(max_depth))
            .collect();
        Engine::new(self.name.clone(), self.initial_state.clone(), handlers)
            .with_initial_messages(initial_messages)
    }
}

impl HandlerDef {
    pub(crate) fn from_value(engine: &str, value: &Value) -> Option<Self> {
        let Some(fields) = value.as_map() else {
            warn!(engine, found = value.type_name(), "message handler is not an object, skipping");
            return None;
        };
        Some(Self {
            guard: string_field(fields.get("guard"), "guard"),
            state_effect: string_field(fields.get("stateEffect"), "stateEffect"),
            generate_messages: templates_from(fields.get("generateMessages"), "generateMessages"),
        })
    }

    /// Compile into a core handler
    pub fn compile(&self, max_depth: usize) -> Handler {
        let rule = |source: &Option<String>| {
            Rule::with_max_depth(source.clone().unwrap_or_default(), max_depth)
        };
        Handler {
            guard: rule(&self.guard),
            state_effect: rule(&self.state_effect),
            generate: self
                .generate_messages
                .iter()
                .map(|template| template.compile(max_depth))
                .collect(),
        }
    }
}
