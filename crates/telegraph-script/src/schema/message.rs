//! Message template schema

use serde::{Deserialize, Serialize};
use telegraph_core::{MessageTemplate, Payload, Target, Value};
use tracing::warn;

/// A message an engine sends, as written in the document
///
/// `to` and `type` are required for the message to be sent, but a template
/// missing them is still accepted here and skipped at send time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateDef {
    /// Target engine name, or `"from"` for the sender of the triggering message
    #[serde(default)]
    pub to: Option<String>,
    /// Message type
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Literal payload, or a rule string evaluated against `{ state }`
    #[serde(default)]
    pub payload: Value,
}

impl TemplateDef {
    /// Read a template from a document value
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        let Some(fields) = value.as_map() else {
            warn!(found = value.type_name(), "message template is not an object, skipping");
            return None;
        };
        Some(Self {
            to: string_field(fields.get("to"), "to"),
            kind: string_field(fields.get("type"), "type"),
            payload: fields.get("payload").cloned().unwrap_or_default(),
        })
    }

    /// Compile into a core template
    pub fn compile(&self, max_depth: usize) -> MessageTemplate {
        MessageTemplate {
            to: self.to.as_deref().map(Target::parse),
            kind: self.kind.clone(),
            payload: Payload::from_value(self.payload.clone(), max_depth),
        }
    }
}

/// Read a list of templates; anything but an array is treated as empty
pub(crate) fn templates_from(value: Option<&Value>, field: &str) -> Vec<TemplateDef> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::List(items)) => items.iter().filter_map(TemplateDef::from_value).collect(),
        Some(other) => {
            warn!(field, found = other.type_name(), "expected an array, ignoring");
            Vec::new()
        }
    }
}

/// Read an optional string field; other types count as missing
pub(crate) fn string_field(value: Option<&Value>, field: &str) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => {
            warn!(field, found = other.type_name(), "expected a string, ignoring");
            None
        }
    }
}
