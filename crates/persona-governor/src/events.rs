//! Lifecycle notifications and the sinks that receive them.
//!
//! The governor only writes to a sink; it never reads events back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Category attached to every lifecycle event.
pub const SYSTEM_CATEGORY: &str = "system";

/// Reputation delta emitted on genesis.
pub const GENESIS_KARMA_DELTA: i64 = 5;
/// Reputation delta emitted when a session is forced down.
pub const TRIP_KARMA_DELTA: i64 = -5;
/// Reputation delta emitted on session end.
pub const DEMISE_KARMA_DELTA: i64 = -1;

/// Structured lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub description: String,
    pub category: String,
    pub timestamp: DateTime<Utc>,
    pub reputation_delta: i64,
}

impl LifecycleEvent {
    /// Creates a `system` event stamped with the current wall-clock time.
    pub fn system(description: impl Into<String>, reputation_delta: i64) -> Self {
        Self {
            description: description.into(),
            category: SYSTEM_CATEGORY.to_string(),
            timestamp: Utc::now(),
            reputation_delta,
        }
    }
}

/// Write-only receiver of lifecycle events (event bus, log, test recorder).
pub trait EventSink {
    fn emit(&self, event: LifecycleEvent);
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&self, event: LifecycleEvent) {
        (**self).emit(event)
    }
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: LifecycleEvent) {
        (**self).emit(event)
    }
}

/// Forwards events to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: LifecycleEvent) {
        info!(
            target: "persona::events",
            category = %event.category,
            reputation_delta = event.reputation_delta,
            timestamp = %event.timestamp.to_rfc3339(),
            "{}",
            event.description
        );
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: LifecycleEvent) {}
}

/// Keeps events in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, oldest first.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of reputation deltas across all recorded events.
    pub fn net_reputation(&self) -> i64 {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.reputation_delta)
            .sum()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
