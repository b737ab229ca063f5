//! Rule evaluation for guards, state effects and payload generators
//!
//! Rules are small JavaScript-flavoured snippets authored in the input
//! document. They are compiled once into a syntax tree and interpreted
//! against a named [`Context`]; nothing outside the context is reachable.
//!
//! Evaluation never fails from the caller's point of view:
//! - an empty rule yields the caller's default
//! - a rule that does not parse yields the caller's default
//! - a rule that fails while running yields the [`ErrorFallback`] value
//!   (by default the first context binding)

mod ast;
mod interp;
mod lexer;
mod parser;

use crate::{Value, ValueMap};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use ast::Program;

/// Maximum syntactic nesting accepted by default
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Errors raised while compiling a rule
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("unterminated comment starting at offset {offset}")]
    UnterminatedComment { offset: usize },

    #[error("invalid escape sequence at offset {offset}")]
    InvalidEscape { offset: usize },

    #[error("invalid number '{text}' at offset {offset}")]
    InvalidNumber { text: String, offset: usize },

    #[error("expected {expected}, found {found} at offset {offset}")]
    UnexpectedToken {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("invalid assignment target at offset {offset}")]
    InvalidAssignmentTarget { offset: usize },

    #[error("'{word}' is reserved and cannot be used here (offset {offset})")]
    ReservedWord { word: String, offset: usize },

    #[error("rule nesting exceeds the maximum depth of {max}")]
    TooDeep { max: usize },
}

/// Errors raised while running a compiled rule
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("{0} is not defined")]
    UnknownVariable(String),

    #[error("cannot read property '{property}' of null")]
    NullAccess { property: String },

    #[error("operator {op} cannot compare {left} with {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("operator {op} does not accept a {got}")]
    InvalidOperand { op: &'static str, got: &'static str },

    #[error("division by zero")]
    DivisionByZero,

    #[error("{0} is not a function")]
    NotCallable(String),

    #[error("unknown method {method} on {receiver}")]
    UnknownMethod {
        method: String,
        receiver: &'static str,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid assignment: {0}")]
    InvalidAssignment(String),
}

/// What a rule resolves to when it fails while running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorFallback {
    /// The value of the first binding inserted into the context
    ///
    /// The executor always binds `state` first, so a failing guard or effect
    /// sees the current state. Note that a non-empty state is truthy, so a
    /// failing guard matches.
    #[default]
    FirstBinding,
    /// The default supplied by the caller
    CallerDefault,
}

/// Named values visible to a rule, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    bindings: ValueMap,
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding (builder style)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bind(name, value);
        self
    }

    /// Add or replace a binding; a replaced binding keeps its position
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    /// Look up a binding
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// The first binding's value, used by [`ErrorFallback::FirstBinding`]
    pub fn first(&self) -> Option<&Value> {
        self.bindings.first().map(|(_, value)| value)
    }

    /// All bindings in insertion order
    pub fn bindings(&self) -> &ValueMap {
        &self.bindings
    }
}

/// A compiled rule string
///
/// Serializes as its source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Rule {
    source: String,
    compiled: Result<Program, ParseError>,
}

impl Rule {
    /// Compile a rule with the default nesting limit
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_max_depth(source, DEFAULT_MAX_DEPTH)
    }

    /// Compile a rule with an explicit nesting limit
    pub fn with_max_depth(source: impl Into<String>, max_depth: usize) -> Self {
        let source = source.into();
        let compiled = parser::parse_program(&source, max_depth);
        if let Err(error) = &compiled {
            if !source.trim().is_empty() {
                warn!(rule = %source, %error, "rule does not parse and will resolve to its default");
            }
        }
        Self { source, compiled }
    }

    /// The source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the rule has no code at all
    pub fn is_empty(&self) -> bool {
        self.source.trim().is_empty()
    }

    /// The compile error, if the rule does not parse
    pub fn parse_error(&self) -> Option<&ParseError> {
        self.compiled.as_ref().err()
    }

    /// Evaluate against `context`
    ///
    /// Returns `None` when the rule produces no value (a block without
    /// `return`, or a `default` of `None`).
    pub fn evaluate(
        &self,
        context: &Context,
        default: Option<Value>,
        fallback: ErrorFallback,
    ) -> Option<Value> {
        if self.is_empty() {
            return default;
        }
        let program = match &self.compiled {
            Ok(program) => program,
            Err(error) => {
                debug!(rule = %self.source, %error, "skipping rule that does not parse");
                return default;
            }
        };

        match interp::run(program, context.bindings()) {
            Ok(value) => {
                trace!(rule = %self.source, result = ?value, "rule evaluated");
                value
            }
            Err(error) => {
                warn!(rule = %self.source, %error, ?fallback, "rule failed while running");
                match fallback {
                    ErrorFallback::FirstBinding => {
                        Some(context.first().cloned().unwrap_or(Value::Null))
                    }
                    ErrorFallback::CallerDefault => default,
                }
            }
        }
    }

    /// Evaluate and coerce the result to a boolean (absent value is `false`)
    pub fn test(&self, context: &Context, fallback: ErrorFallback) -> bool {
        self.evaluate(context, Some(Value::Bool(false)), fallback)
            .is_some_and(|value| value.is_truthy())
    }
}

impl Default for Rule {
    fn default() -> Self {
        Rule::new("")
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl From<String> for Rule {
    fn from(source: String) -> Self {
        Rule::new(source)
    }
}

impl From<&str> for Rule {
    fn from(source: &str) -> Self {
        Rule::new(source)
    }
}

impl From<Rule> for String {
    fn from(rule: Rule) -> Self {
        rule.source
    }
}

/// Evaluate a rule string in one go
///
/// Compiles `code` and evaluates it with [`ErrorFallback::FirstBinding`].
pub fn evaluate(code: &str, context: &Context, default: Option<Value>) -> Option<Value> {
    Rule::new(code).evaluate(context, default, ErrorFallback::FirstBinding)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_context(count: i64) -> Context {
        let state: Value = [("count", count)].into_iter().collect();
        Context::new()
            .with("state", state)
            .with("payload", Value::Null)
    }

    #[test]
    fn test_empty_rule_returns_default() {
        let ctx = state_context(0);
        assert_eq!(evaluate("", &ctx, Some(Value::Int(7))), Some(Value::Int(7)));
        assert_eq!(evaluate("   ", &ctx, None), None);
    }

    #[test]
    fn test_parse_failure_returns_caller_default() {
        let ctx = state_context(0);
        let rule = Rule::new("state.count +");
        assert!(rule.parse_error().is_some());
        assert_eq!(
            rule.evaluate(&ctx, Some(Value::Bool(false)), ErrorFallback::FirstBinding),
            Some(Value::Bool(false))
        );
    }

    #[test]
    fn test_runtime_failure_returns_first_binding() {
        let ctx = state_context(3);
        // payload is null, so reading a property throws
        let result = evaluate("payload.type === 'ping'", &ctx, Some(Value::Bool(false)));
        assert_eq!(result, ctx.get("state").cloned());
    }

    #[test]
    fn test_runtime_failure_with_caller_default_policy() {
        let ctx = state_context(3);
        let rule = Rule::new("payload.type === 'ping'");
        assert_eq!(
            rule.evaluate(&ctx, Some(Value::Bool(false)), ErrorFallback::CallerDefault),
            Some(Value::Bool(false))
        );
        assert!(!rule.test(&ctx, ErrorFallback::CallerDefault));
        // Under the first-binding rule a failing guard sees the (truthy) state
        assert!(rule.test(&ctx, ErrorFallback::FirstBinding));
    }

    #[test]
    fn test_runtime_failure_with_empty_context_is_null() {
        assert_eq!(evaluate("missing()", &Context::new(), None), Some(Value::Null));
    }

    #[test]
    fn test_first_binding_follows_insertion_order() {
        let ctx = Context::new()
            .with("payload", Value::from("first"))
            .with("state", Value::from("second"))
            .with("payload", Value::from("rebound"));
        assert_eq!(ctx.first(), Some(&Value::from("rebound")));
        assert_eq!(evaluate("boom", &ctx, None), Some(Value::from("rebound")));
    }

    #[test]
    fn test_block_without_return_is_no_value() {
        let ctx = state_context(0);
        assert_eq!(evaluate("state.count = 5;", &ctx, Some(Value::Int(1))), None);
    }

    #[test]
    fn test_long_operator_chains_count_toward_depth() {
        let ctx = Context::new().with("state", Value::Null);
        let short = vec!["1"; 50].join("+");
        assert_eq!(evaluate(&short, &ctx, Some(Value::Bool(false))), Some(Value::Int(50)));

        let long = vec!["1"; 10_000].join("+");
        assert!(matches!(Rule::new(long.as_str()).parse_error(), Some(ParseError::TooDeep { .. })));
        assert_eq!(evaluate(&long, &ctx, Some(Value::Bool(false))), Some(Value::Bool(false)));

        let members = format!("state{}", ".next".repeat(10_000));
        assert_eq!(evaluate(&members, &ctx, Some(Value::Int(0))), Some(Value::Int(0)));
    }

    #[test]
    fn test_undefined_result_is_no_value() {
        let ctx = state_context(0);
        assert_eq!(evaluate("return undefined;", &ctx, Some(Value::Int(1))), None);
        assert_eq!(evaluate("state.missing", &ctx, Some(Value::Int(1))), None);
        assert_eq!(evaluate("return null;", &ctx, None), Some(Value::Null));
    }

    #[test]
    fn test_rule_serializes_as_source() {
        let rule = Rule::new("state.count + 1");
        let text = ron::to_string(&rule).unwrap();
        assert_eq!(text, "\"state.count + 1\"");
        let back: Rule = ron::from_str(&text).unwrap();
        assert_eq!(back, rule);
    }
}
