//! Step executor: delivers messages to engines
//!
//! A delivery runs the receiving engine's handlers in two passes over the
//! same pre-delivery snapshot of its state:
//!
//! 1. the first handler whose guard holds applies its state effect
//! 2. every handler whose guard holds emits its message templates, with
//!    payloads computed from the state after step 1
//!
//! All rule failures are recovered; a delivery itself never fails.

use crate::engine::{Engine, Target};
use crate::rule::Context;
use crate::{Message, MessageId, MessageQueue, RuntimeConfig, Session, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Receives session events as they happen
///
/// Both methods default to doing nothing.
pub trait SessionObserver {
    /// An engine's state was replaced by a state effect
    fn on_engine_state_changed(&mut self, _engine: &str, _state: &Value) {}

    /// A message was enqueued by an engine
    fn on_message_generated(&mut self, _message: &Message) {}
}

/// What happened to a delivered message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryOutcome {
    /// Handlers ran against the receiving engine
    Applied,
    /// The receiving engine does not exist; nothing ran
    UnknownEngine,
    /// The message had been delivered before; nothing ran
    AlreadyDelivered,
}

/// Result of delivering one message
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// ID of the delivered message
    pub message: MessageId,
    pub outcome: DeliveryOutcome,
    /// Whether the receiving engine's state was replaced
    pub state_changed: bool,
    /// Messages enqueued by this delivery, in enqueue order
    pub generated: Vec<Message>,
}

impl Delivery {
    fn skipped(message: MessageId, outcome: DeliveryOutcome) -> Self {
        Self {
            message,
            outcome,
            state_changed: false,
            generated: Vec::new(),
        }
    }
}

/// The executor that processes messages against a [`Session`]
#[derive(Default)]
pub struct Runtime {
    config: RuntimeConfig,
    observers: Vec<Box<dyn SessionObserver>>,
}

impl Runtime {
    /// Create a runtime with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runtime with a custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            config,
            observers: Vec::new(),
        }
    }

    /// Current configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Register an observer; observers are notified in registration order
    pub fn observe(&mut self, observer: impl SessionObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Enqueue every engine's initial messages, in registration order
    ///
    /// Runs once per session; later calls return nothing.
    pub fn start(&mut self, session: &mut Session) -> Vec<Message> {
        if session.started {
            warn!("session already started, ignoring");
            return Vec::new();
        }
        session.started = true;

        let fallback = self.config.error_fallback();
        let mut generated = Vec::new();
        for engine in session.engines.iter() {
            for template in engine.initial_messages() {
                let Some((target, kind)) = template.route() else {
                    warn!(engine = %engine.name(), "skipping initial message without `to` or `type`");
                    continue;
                };
                let Target::Engine(to) = target else {
                    warn!(engine = %engine.name(), "initial message cannot be addressed to `from`, skipping");
                    continue;
                };
                let payload = template.payload.resolve(&engine.state, fallback);
                let message = session.queue.enqueue(engine.name(), to.as_str(), kind, payload);
                notify_generated(&mut self.observers, &message);
                generated.push(message);
            }
        }
        debug!(count = generated.len(), "session started");
        generated
    }

    /// Deliver one message to its target engine
    ///
    /// The message is retired even when its target does not exist, so it is
    /// never delivered twice.
    pub fn deliver(&mut self, session: &mut Session, message: &Message) -> Delivery {
        if session.is_delivered(message.id) {
            warn!(id = %message.id, "message already delivered, ignoring");
            return Delivery::skipped(message.id, DeliveryOutcome::AlreadyDelivered);
        }

        let Some(engine) = session.engines.get(&message.to) else {
            warn!(id = %message.id, engine = %message.to, "message addressed to unknown engine");
            session.retire(message);
            return Delivery::skipped(message.id, DeliveryOutcome::UnknownEngine);
        };

        if engine.handlers().is_empty() {
            debug!(engine = %message.to, "engine has no message handlers");
        }

        let fallback = self.config.error_fallback();
        let snapshot = engine.state.clone();
        let guard_ctx = guard_context(&snapshot, message);

        // State effect of the first matching handler
        let mut state_changed = false;
        if let Some(index) = engine.matching_handler(&guard_ctx, fallback) {
            let effect = &engine.handlers()[index].state_effect;
            if !effect.is_empty() {
                let effect_ctx = Context::new()
                    .with("state", snapshot.clone())
                    .with("payload", message.payload.clone())
                    .with("from", message.from.as_str());
                if let Some(state) = effect.evaluate(&effect_ctx, None, fallback) {
                    debug!(engine = %message.to, handler = index, %state, "engine state changed");
                    if let Some(engine) = session.engines.get_mut(&message.to) {
                        engine.state = state;
                        notify_state_changed(&mut self.observers, engine);
                        state_changed = true;
                    }
                }
            }
        }

        let generated = match session.engines.get(&message.to) {
            Some(engine) => self.generate(engine, &mut session.queue, &guard_ctx, message),
            None => Vec::new(),
        };

        session.retire(message);
        debug!(
            id = %message.id,
            engine = %message.to,
            state_changed,
            generated = generated.len(),
            "message delivered"
        );
        Delivery {
            message: message.id,
            outcome: DeliveryOutcome::Applied,
            state_changed,
            generated,
        }
    }

    /// Emit templates of every handler whose guard holds against the
    /// pre-delivery snapshot in `guard_ctx`
    fn generate(
        &mut self,
        engine: &Engine,
        queue: &mut MessageQueue,
        guard_ctx: &Context,
        message: &Message,
    ) -> Vec<Message> {
        let fallback = self.config.error_fallback();
        let cap = self.config.max_generated_per_delivery();
        let mut generated = Vec::new();

        for (index, handler) in engine.handlers().iter().enumerate() {
            if handler.generate.is_empty() || !handler.guard.test(guard_ctx, fallback) {
                continue;
            }
            for template in &handler.generate {
                let Some((target, kind)) = template.route() else {
                    warn!(engine = %engine.name(), handler = index, "skipping generated message without `to` or `type`");
                    continue;
                };
                if cap.is_some_and(|max| generated.len() >= max) {
                    warn!(engine = %engine.name(), max = ?cap, "generated message cap reached, dropping the rest");
                    return generated;
                }
                let to = target.resolve(&message.from);
                let payload = template.payload.resolve(&engine.state, fallback);
                let generated_message = queue.enqueue(engine.name(), to, kind, payload);
                notify_generated(&mut self.observers, &generated_message);
                generated.push(generated_message);
            }
        }
        generated
    }

    /// Present pending messages if needed and deliver the oldest one
    ///
    /// Returns `None` once there is nothing left to deliver.
    pub fn step(&mut self, session: &mut Session) -> Option<Delivery> {
        if session.in_flight.is_empty() {
            session.present_pending();
        }
        let message = session.in_flight.front()?.clone();
        Some(self.deliver(session, &message))
    }

    /// Step until the session is idle or `max_steps` deliveries ran
    pub fn run(&mut self, session: &mut Session, max_steps: usize) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        while deliveries.len() < max_steps {
            match self.step(session) {
                Some(delivery) => deliveries.push(delivery),
                None => break,
            }
        }
        if !session.is_idle() {
            debug!(max_steps, "run stopped with messages outstanding");
        }
        deliveries
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish()
    }
}

fn guard_context(state: &Value, message: &Message) -> Context {
    Context::new()
        .with("state", state.clone())
        .with("payload", message.payload.clone())
        .with("from", message.from.as_str())
        .with("messageType", message.kind.as_str())
}

fn notify_state_changed(observers: &mut [Box<dyn SessionObserver>], engine: &Engine) {
    for observer in observers.iter_mut() {
        observer.on_engine_state_changed(engine.name(), &engine.state);
    }
}

fn notify_generated(observers: &mut [Box<dyn SessionObserver>], message: &Message) {
    for observer in observers.iter_mut() {
        observer.on_message_generated(message);
    }
}

// ============================================================================
// Journal Integration (feature = "journal")
// ============================================================================

#[cfg(feature = "journal")]
use crate::journal::Journal;

#[cfg(feature = "journal")]
impl Runtime {
    /// Deliver a message and record the delivery in `journal`
    pub fn deliver_with_journal(
        &mut self,
        session: &mut Session,
        message: &Message,
        journal: &mut Journal,
    ) -> Delivery {
        let delivery = self.deliver(session, message);
        let state_after = session.engine(&message.to).map(|engine| engine.state.clone());
        journal.record_delivery(message, &delivery, state_after);
        delivery
    }

    /// Like [`Runtime::step`], recording the delivery in `journal`
    pub fn step_with_journal(
        &mut self,
        session: &mut Session,
        journal: &mut Journal,
    ) -> Option<Delivery> {
        if session.in_flight.is_empty() {
            session.present_pending();
        }
        let message = session.in_flight.front()?.clone();
        Some(self.deliver_with_journal(session, &message, journal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Handler, MessageTemplate, Payload, Target};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl SessionObserver for Recorder {
        fn on_engine_state_changed(&mut self, engine: &str, state: &Value) {
            self.events.borrow_mut().push(format!("state {} {}", engine, state));
        }

        fn on_message_generated(&mut self, message: &Message) {
            self.events
                .borrow_mut()
                .push(format!("message {} {}->{}", message.kind, message.from, message.to));
        }
    }

    fn counter() -> Value {
        [("count", 0)].into_iter().collect()
    }

    #[test]
    fn test_unknown_engine() {
        let mut session = Session::new();
        let mut runtime = Runtime::new();
        let message = session.inject("X", "nobody", "ping", Value::Null);

        let delivery = runtime.deliver(&mut session, &message);
        assert_eq!(delivery.outcome, DeliveryOutcome::UnknownEngine);
        assert!(!delivery.state_changed);
        assert!(delivery.generated.is_empty());
        assert!(session.is_delivered(message.id));
    }

    #[test]
    fn test_double_delivery_is_ignored() {
        let mut session = Session::new();
        session
            .register(
                "A",
                counter(),
                vec![Handler::new("true").with_effect("({ count: state.count + 1 })")],
            )
            .unwrap();
        let mut runtime = Runtime::new();
        let message = session.inject("X", "A", "ping", Value::Null);

        assert!(runtime.deliver(&mut session, &message).state_changed);
        let again = runtime.deliver(&mut session, &message);
        assert_eq!(again.outcome, DeliveryOutcome::AlreadyDelivered);
        assert_eq!(session.engine("A").unwrap().state.get("count"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_observers_see_state_then_messages() {
        let mut session = Session::new();
        let handler = Handler::new("messageType === 'ping'")
            .with_effect("({ ...state, count: state.count + 1 })")
            .with_message(MessageTemplate::new(
                Target::Sender,
                "pong",
                Payload::from_value(Value::from("state.count"), 64),
            ));
        session.register("B", counter(), vec![handler]).unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        let mut runtime = Runtime::new();
        runtime.observe(Recorder {
            events: events.clone(),
        });

        let message = session.inject("A", "B", "ping", Value::Null);
        let delivery = runtime.deliver(&mut session, &message);

        assert_eq!(
            *events.borrow(),
            vec![
                r#"state B {"count":1}"#.to_string(),
                "message pong B->A".to_string(),
            ]
        );
        // Payload sees the post-effect state
        assert_eq!(delivery.generated[0].payload, Value::Int(1));
    }

    #[test]
    fn test_fan_out_cap() {
        let mut session = Session::new();
        let template = MessageTemplate::new(Target::Sender, "echo", Payload::default());
        let handler = Handler::new("true")
            .with_message(template.clone())
            .with_message(template.clone())
            .with_message(template);
        session.register("B", Value::Null, vec![handler]).unwrap();

        let mut runtime = Runtime::with_config(RuntimeConfig::default().with_max_generated_per_delivery(2));
        let message = session.inject("A", "B", "ping", Value::Null);
        let delivery = runtime.deliver(&mut session, &message);
        assert_eq!(delivery.generated.len(), 2);
        assert_eq!(session.queue().len(), 2);
    }

    #[test]
    fn test_start_runs_once() {
        let mut session = Session::new();
        let engine = Engine::new("A", counter(), vec![]).with_initial_messages(vec![
            MessageTemplate::new(Target::Engine("B".into()), "hello", Payload::from_value(Value::from("state.count"), 64)),
            MessageTemplate::new(Target::Sender, "bad", Payload::default()),
            MessageTemplate::default(),
        ]);
        session.register_engine(engine).unwrap();

        let mut runtime = Runtime::new();
        let started = runtime.start(&mut session);
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].from, "A");
        assert_eq!(started[0].to, "B");
        assert_eq!(started[0].payload, Value::Int(0));
        assert!(runtime.start(&mut session).is_empty());
    }

    #[test]
    fn test_run_stops_when_idle() {
        let mut session = Session::new();
        session.register("A", Value::Null, vec![]).unwrap();
        session.inject("X", "A", "one", Value::Null);
        session.inject("X", "A", "two", Value::Null);

        let mut runtime = Runtime::new();
        let deliveries = runtime.run(&mut session, 10);
        assert_eq!(deliveries.len(), 2);
        assert!(session.is_idle());
        assert!(runtime.step(&mut session).is_none());
    }
}
