//! Document loader for JSON and RON sources

use crate::error::{Error, Result};
use crate::schema::{Document, EngineDef};
use std::fs;
use std::path::Path;
use telegraph_core::Value;
use tracing::{debug, info, warn};

/// Loader for input documents
///
/// Several documents may be loaded into one loader; their engines are
/// concatenated in load order.
#[derive(Debug, Default)]
pub struct Loader {
    document: Document,
}

impl Loader {
    /// Create a new loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a document from a JSON string
    pub fn load_json_str(&mut self, content: &str) -> Result<()> {
        let value: Value = serde_json::from_str(content)?;
        self.load_value(&value)
    }

    /// Load a document from a RON string
    pub fn load_ron_str(&mut self, content: &str) -> Result<()> {
        let value: Value = ron::from_str(content)?;
        self.load_value(&value)
    }

    /// Load an already parsed document value
    pub fn load_value(&mut self, value: &Value) -> Result<()> {
        let document = Document::from_value(value)?;
        for engine in document.engines {
            self.push(engine);
        }
        Ok(())
    }

    /// Load a file, picking the format from its extension (`.json` or `.ron`)
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        info!(path = %path.display(), "loading document");
        match extension.as_str() {
            "json" => self.load_json_str(&content),
            "ron" => self.load_ron_str(&content),
            other => Err(Error::UnsupportedFormat(format!(
                "{:?} (expected .json or .ron)",
                other
            ))),
        }
    }

    /// Load either an inline JSON document or a path to one
    ///
    /// Text that starts with `{` is parsed as JSON; anything else is a path.
    pub fn load_source(&mut self, source: &str) -> Result<()> {
        let trimmed = source.trim_start();
        if trimmed.starts_with('{') {
            debug!("loading inline document");
            self.load_json_str(trimmed)
        } else {
            self.load_file(source.trim())
        }
    }

    fn push(&mut self, engine: EngineDef) {
        if self.document.engine(&engine.name).is_some() {
            warn!(engine = %engine.name, "engine defined twice, the later definition wins");
        }
        self.document.engines.push(engine);
    }

    /// Finish loading and return the document
    pub fn finish(self) -> Document {
        self.document
    }

    /// Get the current document (for inspection during loading)
    pub fn document(&self) -> &Document {
        &self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telegraph_core::{Runtime, RuntimeConfig, Target};

    const PING_PONG: &str = r#"
    {
        "engines": [
            {
                "name": "A",
                "initialState": { "count": 0 },
                "messageHandlers": [
                    {
                        "guard": "messageType === 'ping'",
                        "stateEffect": "({ ...state, count: state.count + 1 })",
                        "generateMessages": [
                            { "to": "from", "type": "pong", "payload": "state.count" }
                        ]
                    }
                ]
            },
            {
                "name": "B",
                "initialMessages": [
                    { "to": "A", "type": "ping", "payload": { "n": 1 } }
                ]
            }
        ]
    }
    "#;

    #[test]
    fn test_load_json() {
        let mut loader = Loader::new();
        loader.load_json_str(PING_PONG).unwrap();
        let document = loader.finish();

        assert_eq!(document.engines.len(), 2);
        let a = document.engine("A").unwrap();
        assert_eq!(a.message_handlers.len(), 1);
        assert_eq!(a.message_handlers[0].generate_messages[0].to.as_deref(), Some("from"));

        let b = document.engine("B").unwrap();
        assert_eq!(b.initial_state, Value::Null);
        assert!(b.message_handlers.is_empty());
        assert_eq!(b.initial_messages[0].kind.as_deref(), Some("ping"));
    }

    #[test]
    fn test_into_session_and_run() {
        let mut loader = Loader::new();
        loader.load_json_str(PING_PONG).unwrap();
        let mut session = loader.finish().into_session(&RuntimeConfig::default());

        let engine = session.engine("A").unwrap();
        assert_eq!(engine.handlers()[0].generate[0].to, Some(Target::Sender));

        let mut runtime = Runtime::new();
        runtime.start(&mut session);
        let deliveries = runtime.run(&mut session, 10);

        // ping to A, then pong back to B (which has no handlers)
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].generated[0].payload, Value::Int(1));
        assert_eq!(
            session.engine("A").unwrap().state.get("count"),
            Some(&Value::Int(1))
        );
    }

    #[test]
    fn test_missing_engines_is_invalid() {
        let mut loader = Loader::new();
        assert!(matches!(
            loader.load_json_str(r#"{ "engine": [] }"#),
            Err(Error::InvalidDocument(_))
        ));
        assert!(matches!(
            loader.load_json_str(r#"{ "engines": { "name": "A" } }"#),
            Err(Error::InvalidDocument(_))
        ));
        assert!(matches!(loader.load_json_str("[1, 2]"), Err(Error::InvalidDocument(_))));
        assert!(matches!(loader.load_json_str("{ nope"), Err(Error::Json(_))));
    }

    #[test]
    fn test_lenient_entries() {
        let content = r#"
        {
            "engines": [
                { "initialState": 1 },
                { "name": "" },
                "not an engine",
                {
                    "name": "A",
                    "messageHandlers": "oops",
                    "initialMessages": [ 42, { "to": "B" } ]
                },
                {
                    "name": "C",
                    "messageHandlers": [ { "guard": 7 }, null, { "stateEffect": "state" } ]
                }
            ]
        }
        "#;
        let mut loader = Loader::new();
        loader.load_json_str(content).unwrap();
        let document = loader.finish();

        let names: Vec<_> = document.engines.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);

        let a = document.engine("A").unwrap();
        assert!(a.message_handlers.is_empty());
        assert_eq!(a.initial_messages.len(), 1);
        assert_eq!(a.initial_messages[0].kind, None);

        let c = document.engine("C").unwrap();
        assert_eq!(c.message_handlers.len(), 2);
        assert_eq!(c.message_handlers[0].guard, None);
    }

    #[test]
    fn test_load_ron() {
        let content = r#"
        {
            "engines": [
                {
                    "name": "A",
                    "initialState": { "count": 0 },
                    "messageHandlers": [ { "guard": "true", "stateEffect": "state" } ],
                },
            ],
        }
        "#;
        let mut loader = Loader::new();
        loader.load_ron_str(content).unwrap();
        let document = loader.finish();
        assert_eq!(document.engines.len(), 1);
        assert_eq!(
            document.engines[0].initial_state.get("count"),
            Some(&Value::Int(0))
        );
    }

    #[test]
    fn test_load_source_inline() {
        let mut loader = Loader::new();
        loader
            .load_source(r#"  { "engines": [ { "name": "solo" } ] }"#)
            .unwrap();
        assert!(loader.document().engine("solo").is_some());
    }

    #[test]
    fn test_load_file_rejects_unknown_extension() {
        let path = std::env::temp_dir().join("telegraph-script-test.yaml");
        fs::write(&path, "engines: []").unwrap();
        let mut loader = Loader::new();
        assert!(matches!(
            loader.load_file(&path),
            Err(Error::UnsupportedFormat(_))
        ));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_file_json() {
        let path = std::env::temp_dir().join("telegraph-script-test-ping-pong.json");
        fs::write(&path, PING_PONG).unwrap();
        let mut loader = Loader::new();
        loader.load_source(path.to_str().unwrap()).unwrap();
        assert_eq!(loader.finish().engines.len(), 2);
        let _ = fs::remove_file(&path);
    }
}
