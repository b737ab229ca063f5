//! Session state: everything one simulation run owns

use crate::engine::{Engine, EngineRegistry, Handler};
use crate::msg::{dedupe, Message, MessageQueue};
use crate::{MessageId, Result, Value};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// The complete state of a simulation run
///
/// Owns the engines, the pending queue and the bookkeeping that keeps every
/// message presented at most once and delivered at most once. Nothing is
/// global, so independent sessions can coexist.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// All engines by name
    pub(crate) engines: EngineRegistry,
    /// Messages not yet presented
    pub(crate) queue: MessageQueue,
    /// Presented but not yet delivered, oldest first
    pub(crate) in_flight: VecDeque<Message>,
    /// Every ID ever presented
    pub(crate) presented: HashSet<MessageId>,
    /// Every ID ever delivered
    pub(crate) delivered: HashSet<MessageId>,
    /// Delivered messages in delivery order
    pub(crate) history: Vec<Message>,
    /// Whether initial messages were enqueued
    pub(crate) started: bool,
}

impl Session {
    /// Create an empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session around an existing registry
    pub fn with_engines(engines: EngineRegistry) -> Self {
        Self {
            engines,
            ..Default::default()
        }
    }

    /// Register an engine
    pub fn register(
        &mut self,
        name: impl Into<String>,
        initial_state: Value,
        handlers: Vec<Handler>,
    ) -> Result<&Engine> {
        self.engines.register(name, initial_state, handlers)
    }

    /// Register a fully built engine
    pub fn register_engine(&mut self, engine: Engine) -> Result<&Engine> {
        self.engines.register_engine(engine)
    }

    /// The engine registry
    pub fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    /// Get an engine by name
    pub fn engine(&self, name: &str) -> Option<&Engine> {
        self.engines.get(name)
    }

    /// The pending queue
    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Enqueue a message from outside any engine
    ///
    /// The message follows the normal presentation and delivery path.
    pub fn inject(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        kind: impl Into<String>,
        payload: Value,
    ) -> Message {
        self.queue.enqueue(from, to, kind, payload)
    }

    /// Move pending messages onto the timeline
    ///
    /// Drains the queue, drops anything already presented and returns the
    /// fresh messages in enqueue order. Calling it again without new
    /// enqueues returns nothing.
    pub fn present_pending(&mut self) -> Vec<Message> {
        let fresh = dedupe(self.queue.drain_pending(), &self.presented);
        for message in &fresh {
            self.presented.insert(message.id);
            self.in_flight.push_back(message.clone());
        }
        if !fresh.is_empty() {
            debug!(count = fresh.len(), "messages presented");
        }
        fresh
    }

    /// Presented messages awaiting delivery, oldest first
    pub fn in_flight(&self) -> impl Iterator<Item = &Message> {
        self.in_flight.iter()
    }

    /// Delivered messages in delivery order
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Whether a message was already delivered
    pub fn is_delivered(&self, id: MessageId) -> bool {
        self.delivered.contains(&id)
    }

    /// Whether a message was ever presented
    pub fn is_presented(&self, id: MessageId) -> bool {
        self.presented.contains(&id)
    }

    /// Whether the session has nothing left to present or deliver
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }

    /// Whether initial messages were enqueued
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Record a delivery; returns false if the ID was already delivered
    pub(crate) fn retire(&mut self, message: &Message) -> bool {
        if !self.delivered.insert(message.id) {
            return false;
        }
        self.in_flight.retain(|m| m.id != message.id);
        self.history.push(message.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_pending_marks_presented_once() {
        let mut session = Session::new();
        let a = session.inject("A", "B", "ping", Value::Null);
        let b = session.inject("A", "B", "ping", Value::Null);

        let fresh = session.present_pending();
        assert_eq!(fresh, vec![a.clone(), b.clone()]);
        assert!(session.is_presented(a.id));
        assert!(session.present_pending().is_empty());
        assert_eq!(session.in_flight().count(), 2);
    }

    #[test]
    fn test_retire_once() {
        let mut session = Session::new();
        let a = session.inject("A", "B", "ping", Value::Null);
        session.present_pending();

        assert!(session.retire(&a));
        assert!(!session.retire(&a));
        assert!(session.is_delivered(a.id));
        assert_eq!(session.history(), &[a]);
        assert!(session.is_idle());
    }

    #[test]
    fn test_register_through_session() {
        let mut session = Session::new();
        session.register("A", Value::Int(0), vec![]).unwrap();
        assert!(session.engine("A").is_some());
        assert!(session.register("", Value::Null, vec![]).is_err());
    }
}
