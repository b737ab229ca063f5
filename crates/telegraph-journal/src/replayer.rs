//! Deterministic replay of a recorded delivery order
//!
//! Message IDs come from a counter, so a fresh session built from the same
//! document and started the same way assigns the same IDs. Replaying the
//! journal's delivery order must then reproduce every entry exactly.

use crate::{Error, Result};
use telegraph_core::{Delivery, Journal, JournalEntry, Message, MessageId, Runtime, Session, Value};
use tracing::debug;

/// State of the replayer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    /// Not started
    Idle,
    /// Some entries replayed
    Paused,
    /// Every entry replayed and matched
    Finished,
    /// An entry did not match
    Diverged,
}

/// Replayer for journal data
pub struct Replayer<'a> {
    entries: &'a [JournalEntry],
    state: ReplayState,
    position: usize,
}

impl<'a> Replayer<'a> {
    /// Create a new replayer for a journal
    pub fn new(journal: &'a Journal) -> Self {
        Self::from_entries(journal.entries())
    }

    /// Create a replayer over a slice of entries (e.g. read back from an export)
    pub fn from_entries(entries: &'a [JournalEntry]) -> Self {
        Self {
            entries,
            state: ReplayState::Idle,
            position: 0,
        }
    }

    /// Get the current state
    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// Number of entries replayed so far
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of entries in the recording
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the recording is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replay the next entry
    ///
    /// Returns `Ok(None)` once every entry has been replayed. Replay starts
    /// from a fresh session, so the entries must run from sequence 0 without
    /// gaps; a trimmed or filtered journal fails with [`Error::Incomplete`].
    pub fn step(&mut self, session: &mut Session, runtime: &mut Runtime) -> Result<Option<Delivery>> {
        let Some(entry) = self.entries.get(self.position) else {
            self.state = ReplayState::Finished;
            return Ok(None);
        };
        let expected = self.position as u64;
        if entry.seq != expected {
            self.state = ReplayState::Diverged;
            return Err(Error::Incomplete {
                expected,
                found: entry.seq,
            });
        }

        let message = match find_message(session, entry) {
            Some(message) => message,
            None => {
                self.state = ReplayState::Diverged;
                return Err(Error::MessageNotFound {
                    seq: entry.seq,
                    id: entry.message.id,
                });
            }
        };

        let delivery = runtime.deliver(session, &message);
        let state_after = session.engine(&message.to).map(|engine| engine.state.clone());
        if let Err(error) = compare(entry, &message, &delivery, state_after.as_ref()) {
            self.state = ReplayState::Diverged;
            return Err(error);
        }

        self.position += 1;
        self.state = if self.position == self.entries.len() {
            ReplayState::Finished
        } else {
            ReplayState::Paused
        };
        debug!(seq = entry.seq, id = %message.id, "entry replayed");
        Ok(Some(delivery))
    }

    /// Replay up to and including entry `seq`
    pub fn goto(&mut self, session: &mut Session, runtime: &mut Runtime, seq: u64) -> Result<()> {
        while let Some(entry) = self.entries.get(self.position) {
            if entry.seq > seq {
                break;
            }
            self.step(session, runtime)?;
        }
        Ok(())
    }

    /// Replay every remaining entry
    pub fn replay_all(&mut self, session: &mut Session, runtime: &mut Runtime) -> Result<usize> {
        let start = self.position;
        while self.step(session, runtime)?.is_some() {}
        Ok(self.position - start)
    }
}

/// The recorded message, taken from the session's timeline
fn find_message(session: &mut Session, entry: &JournalEntry) -> Option<Message> {
    let id = entry.message.id;
    if let Some(message) = in_flight(session, id) {
        return Some(message);
    }
    if session.is_delivered(id) {
        // Redelivery attempts are recorded too
        return Some(entry.message.clone());
    }
    session.present_pending();
    in_flight(session, id)
}

fn in_flight(session: &Session, id: MessageId) -> Option<Message> {
    session.in_flight().find(|m| m.id == id).cloned()
}

fn compare(
    entry: &JournalEntry,
    message: &Message,
    delivery: &Delivery,
    state_after: Option<&Value>,
) -> Result<()> {
    let diverged = |reason: String| Err(Error::Divergence {
        seq: entry.seq,
        reason,
    });

    if !same_message(message, &entry.message) {
        return diverged(format!("message {} differs from the recording", message.id));
    }
    if delivery.outcome != entry.outcome {
        return diverged(format!(
            "outcome {:?}, recorded {:?}",
            delivery.outcome, entry.outcome
        ));
    }
    if delivery.state_changed != entry.state_changed {
        return diverged(format!(
            "state_changed {}, recorded {}",
            delivery.state_changed, entry.state_changed
        ));
    }
    let generated: Vec<_> = delivery.generated.iter().map(|m| m.id).collect();
    if generated != entry.generated {
        return diverged(format!(
            "generated {:?}, recorded {:?}",
            generated, entry.generated
        ));
    }
    let same_state = match (state_after, entry.state_after.as_ref()) {
        (Some(replayed), Some(recorded)) => same_value(replayed, recorded),
        (None, None) => true,
        _ => false,
    };
    if !same_state {
        return diverged(format!("state of {} differs from the recording", message.to));
    }
    Ok(())
}

fn same_message(a: &Message, b: &Message) -> bool {
    a.id == b.id
        && a.from == b.from
        && a.to == b.to
        && a.kind == b.kind
        && same_value(&a.payload, &b.payload)
}

/// Structural equality where NaN matches NaN
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) if x.is_nan() && y.is_nan() => true,
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| same_value(a, b))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, a)| y.get(key).is_some_and(|b| same_value(a, b)))
        }
        _ => a == b,
    }
}
