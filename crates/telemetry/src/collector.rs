//! Observers for retrieval events.
//!
//! An [`Observer`] is passed into each request; nothing is global. The
//! [`EventCollector`] keeps events in memory for the request it serves,
//! [`TracingObserver`] forwards them to `tracing`.

use crate::model::RetrievalEvent;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Receives retrieval events as they happen.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &RetrievalEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &RetrievalEvent) {}
}

/// Logs every event at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &RetrievalEvent) {
        match serde_json::to_string(event) {
            Ok(json) => debug!(event = event.name(), payload = %json, "Retrieval event"),
            Err(_) => debug!(event = event.name(), "Retrieval event"),
        }
    }
}

/// A timestamped event.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub at: DateTime<Utc>,
    pub event: RetrievalEvent,
}

/// Collects the events of one request.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Mutex<Vec<RecordedEvent>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far, in arrival order.
    pub fn events(&self) -> Vec<RetrievalEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.event.clone())
            .collect()
    }

    pub fn recorded(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of events with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.event.name() == name)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Observer for EventCollector {
    fn on_event(&self, event: &RetrievalEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedEvent {
                at: Utc::now(),
                event: event.clone(),
            });
    }
}

/// Forwards each event to two observers.
pub struct Fanout<'a> {
    first: &'a dyn Observer,
    second: &'a dyn Observer,
}

impl<'a> Fanout<'a> {
    pub fn new(first: &'a dyn Observer, second: &'a dyn Observer) -> Self {
        Self { first, second }
    }
}

impl Observer for Fanout<'_> {
    fn on_event(&self, event: &RetrievalEvent) {
        self.first.on_event(event);
        self.second.on_event(event);
    }
}
