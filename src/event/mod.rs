//! In-process event coordination
//!
//! A process-wide publish/subscribe hub that decouples subsystems mutating
//! dataset state (version control, sync, registry) from the collection
//! index that caches it. Publishing is synchronous: handlers run on the
//! publisher's thread, in subscription order, and the first handler error
//! aborts the rest of the dispatch and is returned to the publisher.
//!
//! Handlers should return quickly. A subscriber doing slow work should
//! hand the event off to its own thread and acknowledge immediately;
//! the bus never times out or isolates a hanging handler.

use crate::error::{HoldingsError, HoldingsResult};
use chrono::Utc;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Category tag distinguishing kinds of events
///
/// Emitting subsystems declare topics as constants and document the
/// expected payload type alongside each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic(pub &'static str);

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event delivered to subscribers
///
/// Events are pure in-process notifications: never persisted, never
/// replayed. The payload's concrete type is defined by the topic.
#[derive(Clone)]
pub struct Event {
    pub topic: Topic,
    /// Unix timestamp in nanoseconds, taken at publish time
    pub timestamp: i64,
    /// Correlation ID tying the event to a long-running session, if any
    pub session_id: Option<String>,
    pub payload: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("topic", &self.topic)
            .field("timestamp", &self.timestamp)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// A subscriber callback
///
/// Called on the publisher's thread for every matching event. Any error
/// is passed back to that publisher unchanged.
pub type Handler = Arc<dyn Fn(&Event) -> HoldingsResult<()> + Send + Sync>;

/// Payload for a publish call
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Central coordination point for event publication and subscription
///
/// Zero or more subscribers register topics to be notified of; a publisher
/// writes a topic event to the bus, which dispatches to all subscribers of
/// that topic, then to session-ID subscribers, then to subscribe-all
/// handlers.
pub trait Bus: Send + Sync {
    /// Publish an event to the bus
    fn publish(&self, topic: Topic, payload: Payload) -> HoldingsResult<()>;
    /// Publish an event carrying a session correlation ID
    fn publish_id(&self, topic: Topic, session_id: &str, payload: Payload) -> HoldingsResult<()>;
    /// Subscribe a handler to one or more topics
    fn subscribe_topics(&self, handler: Handler, topics: &[Topic]);
    /// Subscribe a handler to events matching a session ID
    fn subscribe_id(&self, handler: Handler, session_id: &str);
    /// Subscribe a handler to all events
    fn subscribe_all(&self, handler: Handler);
    /// Number of registered handlers across all subscription kinds
    fn num_subscribers(&self) -> usize;
}

/// Cancellable lifetime scope for event buses
///
/// Cancelling the scope flips every bus bound to it to closed: subsequent
/// publishes fail with [`HoldingsError::BusClosed`] and invoke no handlers.
/// Cancellation is irreversible and does not interrupt a publish already
/// in progress.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    cancelled: Arc<AtomicBool>,
}

impl Shutdown {
    /// Create a live scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the scope, closing every bus bound to it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the scope has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Bus implementation that does nothing
///
/// Lets producers be unconditionally wired to a bus even when nothing
/// consumes events: publishes succeed trivially, subscriptions are
/// dropped on the floor.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullBus;

impl Bus for NullBus {
    fn publish(&self, _topic: Topic, _payload: Payload) -> HoldingsResult<()> {
        Ok(())
    }

    fn publish_id(&self, _topic: Topic, _session_id: &str, _payload: Payload) -> HoldingsResult<()> {
        Ok(())
    }

    fn subscribe_topics(&self, _handler: Handler, _topics: &[Topic]) {}

    fn subscribe_id(&self, _handler: Handler, _session_id: &str) {}

    fn subscribe_all(&self, _handler: Handler) {}

    fn num_subscribers(&self) -> usize {
        0
    }
}

/// Timestamp source, overridable so tests can pin event times
type Clock = fn() -> i64;

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

#[derive(Default)]
struct Subscribers {
    topics: HashMap<Topic, Vec<Handler>>,
    ids: HashMap<String, Vec<Handler>>,
    all: Vec<Handler>,
}

/// The standard [`Bus`] implementation
///
/// Instantiate one per process and pass it explicitly to every component
/// that publishes or subscribes; components that need no coordination
/// take a [`NullBus`] instead.
pub struct EventBus {
    scope: Shutdown,
    clock: Clock,
    subs: RwLock<Subscribers>,
}

impl EventBus {
    /// Create a bus bound to the given lifetime scope
    pub fn new(scope: Shutdown) -> Self {
        Self::with_clock(scope, now_nanos)
    }

    /// Create a bus with a custom timestamp source
    pub fn with_clock(scope: Shutdown, clock: Clock) -> Self {
        Self {
            scope,
            clock,
            subs: RwLock::new(Subscribers::default()),
        }
    }

    fn dispatch(
        &self,
        topic: Topic,
        session_id: Option<&str>,
        payload: Payload,
    ) -> HoldingsResult<()> {
        // Registration and dispatch share this lock, so a handler list is
        // never observed half-updated.
        let subs = self.subs.read().unwrap_or_else(PoisonError::into_inner);

        if self.scope.is_cancelled() {
            return Err(HoldingsError::BusClosed);
        }

        debug!(%topic, session_id, "publish");

        let event = Event {
            topic,
            timestamp: (self.clock)(),
            session_id: session_id.map(str::to_string),
            payload,
        };

        if let Some(handlers) = subs.topics.get(&topic) {
            for handler in handlers {
                handler(&event)?;
            }
        }

        if let Some(sid) = session_id {
            if let Some(handlers) = subs.ids.get(sid) {
                for handler in handlers {
                    handler(&event)?;
                }
            }
        }

        for handler in &subs.all {
            handler(&event)?;
        }

        Ok(())
    }
}

impl Bus for EventBus {
    fn publish(&self, topic: Topic, payload: Payload) -> HoldingsResult<()> {
        self.dispatch(topic, None, payload)
    }

    fn publish_id(&self, topic: Topic, session_id: &str, payload: Payload) -> HoldingsResult<()> {
        self.dispatch(topic, Some(session_id), payload)
    }

    fn subscribe_topics(&self, handler: Handler, topics: &[Topic]) {
        let mut subs = self.subs.write().unwrap_or_else(PoisonError::into_inner);
        debug!(?topics, "subscribe to topics");
        for topic in topics {
            subs.topics
                .entry(*topic)
                .or_default()
                .push(Arc::clone(&handler));
        }
    }

    fn subscribe_id(&self, handler: Handler, session_id: &str) {
        let mut subs = self.subs.write().unwrap_or_else(PoisonError::into_inner);
        debug!(session_id, "subscribe to session");
        subs.ids
            .entry(session_id.to_string())
            .or_default()
            .push(handler);
    }

    fn subscribe_all(&self, handler: Handler) {
        let mut subs = self.subs.write().unwrap_or_else(PoisonError::into_inner);
        debug!("subscribe to all events");
        subs.all.push(handler);
    }

    fn num_subscribers(&self) -> usize {
        let subs = self.subs.read().unwrap_or_else(PoisonError::into_inner);
        let topic_count: usize = subs.topics.values().map(Vec::len).sum();
        let id_count: usize = subs.ids.values().map(Vec::len).sum();
        topic_count + id_count + subs.all.len()
    }
}
