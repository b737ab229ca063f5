//! Journal of deliveries for export, audit and replay
//!
//! Each entry captures one delivery: the message, what happened, the IDs of
//! the messages it generated and the receiving engine's state afterwards.
//!
//! # Example
//!
//! ```rust,ignore
//! use telegraph_core::{Journal, Runtime, Session};
//!
//! let mut journal = Journal::new();
//! journal.start_recording();
//!
//! while let Some(_) = runtime.step_with_journal(&mut session, &mut journal) {}
//! println!("{} deliveries", journal.stats().delivery_count);
//! ```

use crate::runtime::{Delivery, DeliveryOutcome};
use crate::{Message, MessageId, Value};
use serde::{Deserialize, Serialize};

/// One recorded delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the journal, starting at 0
    pub seq: u64,
    /// The delivered message
    pub message: Message,
    pub outcome: DeliveryOutcome,
    pub state_changed: bool,
    /// IDs of messages generated by the delivery
    pub generated: Vec<MessageId>,
    /// Receiving engine's state after the delivery (`None` if it does not exist)
    pub state_after: Option<Value>,
}

/// Configuration for the journal
#[derive(Debug, Clone, Default)]
pub struct JournalConfig {
    /// Whether recording is enabled
    pub recording_enabled: bool,
    /// Maximum number of entries to keep (0 = unlimited)
    ///
    /// Trimming drops the oldest entries, and a trimmed journal can no
    /// longer be replayed from a fresh session.
    pub max_entries: usize,
}

/// Recorded deliveries in delivery order
#[derive(Debug, Clone, Default)]
pub struct Journal {
    config: JournalConfig,
    entries: Vec<JournalEntry>,
    next_seq: u64,
}

impl Journal {
    /// Create a journal; recording is off until [`Journal::start_recording`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration
    pub fn with_config(config: JournalConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    /// Start recording
    pub fn start_recording(&mut self) {
        self.config.recording_enabled = true;
    }

    /// Stop recording
    pub fn stop_recording(&mut self) {
        self.config.recording_enabled = false;
    }

    /// Check if recording is enabled
    pub fn is_recording(&self) -> bool {
        self.config.recording_enabled
    }

    /// Record a delivery
    pub fn record_delivery(&mut self, message: &Message, delivery: &Delivery, state_after: Option<Value>) {
        if !self.config.recording_enabled {
            return;
        }

        self.entries.push(JournalEntry {
            seq: self.next_seq,
            message: message.clone(),
            outcome: delivery.outcome,
            state_changed: delivery.state_changed,
            generated: delivery.generated.iter().map(|m| m.id).collect(),
            state_after,
        });
        self.next_seq += 1;

        if self.config.max_entries > 0 && self.entries.len() > self.config.max_entries {
            let excess = self.entries.len() - self.config.max_entries;
            self.entries.drain(0..excess);
        }
    }

    /// Get all entries
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Delivered message IDs in delivery order
    pub fn delivery_order(&self) -> impl Iterator<Item = MessageId> + '_ {
        self.entries.iter().map(|entry| entry.message.id)
    }

    /// Entries for deliveries to one engine
    pub fn entries_for<'a>(&'a self, engine: &'a str) -> impl Iterator<Item = &'a JournalEntry> + 'a {
        self.entries.iter().filter(move |entry| entry.message.to == engine)
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }

    /// Get statistics about the journal
    pub fn stats(&self) -> JournalStats {
        let count = |outcome: DeliveryOutcome| self.entries.iter().filter(|e| e.outcome == outcome).count();
        JournalStats {
            total_entries: self.entries.len(),
            delivery_count: count(DeliveryOutcome::Applied),
            unknown_engine_count: count(DeliveryOutcome::UnknownEngine),
            state_change_count: self.entries.iter().filter(|e| e.state_changed).count(),
            generated_count: self.entries.iter().map(|e| e.generated.len()).sum(),
        }
    }
}

/// Statistics about the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalStats {
    /// Total number of entries
    pub total_entries: usize,
    /// Deliveries that ran handlers
    pub delivery_count: usize,
    /// Deliveries addressed to a missing engine
    pub unknown_engine_count: usize,
    /// Deliveries that replaced an engine's state
    pub state_change_count: usize,
    /// Messages generated across all deliveries
    pub generated_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Handler, Runtime, Session};

    fn session() -> Session {
        let mut session = Session::new();
        session
            .register(
                "A",
                Value::Int(0),
                vec![Handler::new("true").with_effect("state + 1")],
            )
            .unwrap();
        session
    }

    #[test]
    fn test_journal_disabled_by_default() {
        let mut session = session();
        let mut runtime = Runtime::new();
        let mut journal = Journal::new();
        let message = session.inject("X", "A", "tick", Value::Null);

        runtime.deliver_with_journal(&mut session, &message, &mut journal);
        assert!(journal.entries().is_empty());
    }

    #[test]
    fn test_journal_records_deliveries() {
        let mut session = session();
        let mut runtime = Runtime::new();
        let mut journal = Journal::new();
        journal.start_recording();

        session.inject("X", "A", "tick", Value::Null);
        session.inject("X", "ghost", "tick", Value::Null);
        while runtime.step_with_journal(&mut session, &mut journal).is_some() {}

        let entries = journal.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 0);
        assert_eq!(entries[0].state_after, Some(Value::Int(1)));
        assert_eq!(entries[1].outcome, DeliveryOutcome::UnknownEngine);
        assert_eq!(entries[1].state_after, None);

        let stats = journal.stats();
        assert_eq!(stats.delivery_count, 1);
        assert_eq!(stats.unknown_engine_count, 1);
        assert_eq!(stats.state_change_count, 1);
    }

    #[test]
    fn test_max_entries() {
        let mut journal = Journal::with_config(JournalConfig {
            recording_enabled: true,
            max_entries: 1,
        });
        let mut session = session();
        let mut runtime = Runtime::new();
        session.inject("X", "A", "one", Value::Null);
        session.inject("X", "A", "two", Value::Null);
        while runtime.step_with_journal(&mut session, &mut journal).is_some() {}

        assert_eq!(journal.entries().len(), 1);
        assert_eq!(journal.entries()[0].seq, 1);
    }
}
