//! Messages and the pending queue

use crate::{MessageId, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::trace;

/// A message between two engines
///
/// Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within the session
    pub id: MessageId,
    /// Sending engine
    pub from: String,
    /// Receiving engine (may name an unregistered engine)
    pub to: String,
    /// Message type, exposed to guards as `messageType`
    #[serde(rename = "type")]
    pub kind: String,
    /// Arbitrary payload
    pub payload: Value,
}

/// FIFO of messages awaiting presentation
///
/// Assigns message IDs from a counter starting at 0.
#[derive(Debug, Clone, Default)]
pub struct MessageQueue {
    pending: VecDeque<Message>,
    next_id: u64,
}

impl MessageQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message with a fresh ID and append it
    pub fn enqueue(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        kind: impl Into<String>,
        payload: Value,
    ) -> Message {
        let id = MessageId::new(self.next_id);
        self.next_id += 1;

        let message = Message {
            id,
            from: from.into(),
            to: to.into(),
            kind: kind.into(),
            payload,
        };
        trace!(id = %message.id, from = %message.from, to = %message.to, kind = %message.kind, "message enqueued");
        self.pending.push_back(message.clone());
        message
    }

    /// Remove and return every pending message in enqueue order
    pub fn drain_pending(&mut self) -> Vec<Message> {
        self.pending.drain(..).collect()
    }

    /// Messages waiting, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &Message> {
        self.pending.iter()
    }

    /// Get the number of pending messages
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Drop messages that were already presented, keeping the order of the rest
///
/// Also drops repeats within `candidates` itself.
pub fn dedupe(candidates: Vec<Message>, presented: &HashSet<MessageId>) -> Vec<Message> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|message| !presented.contains(&message.id) && seen.insert(message.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_assigns_sequential_ids() {
        let mut queue = MessageQueue::new();
        let first = queue.enqueue("A", "B", "ping", Value::Null);
        let second = queue.enqueue("B", "A", "pong", Value::Int(1));

        assert_eq!(first.id, MessageId::new(0));
        assert_eq!(second.id, MessageId::new(1));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let mut queue = MessageQueue::new();
        queue.enqueue("A", "B", "one", Value::Null);
        queue.enqueue("A", "B", "two", Value::Null);

        let drained = queue.drain_pending();
        let kinds: Vec<_> = drained.iter().map(|m| m.kind.as_str()).collect();
        assert_eq!(kinds, vec!["one", "two"]);
        assert!(queue.is_empty());
        assert!(queue.drain_pending().is_empty());

        // IDs keep counting after a drain
        assert_eq!(queue.enqueue("A", "B", "three", Value::Null).id, MessageId::new(2));
    }

    #[test]
    fn test_dedupe() {
        let mut queue = MessageQueue::new();
        let a = queue.enqueue("A", "B", "a", Value::Null);
        let b = queue.enqueue("A", "B", "b", Value::Null);

        let presented: HashSet<_> = [a.id].into_iter().collect();
        let fresh = dedupe(vec![a.clone(), b.clone(), b.clone()], &presented);
        assert_eq!(fresh, vec![b]);
    }

    #[test]
    fn test_message_json_shape() {
        let mut queue = MessageQueue::new();
        let message = queue.enqueue("A", "B", "ping", Value::Int(3));
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"id":0,"from":"A","to":"B","type":"ping","payload":3}"#);
    }
}
