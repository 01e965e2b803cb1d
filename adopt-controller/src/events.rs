//! Notifications about adopted resources.
//!
//! Fire-and-forget: publishing never blocks or fails reconciliation.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// One notification about one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub resource: String,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

/// Receiver of resource notifications.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}

/// Sink that writes events to the `events` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: Event) {
        match event.event_type {
            EventType::Normal => {
                info!(target: "events", resource = %event.resource, reason = %event.reason, "{}", event.message)
            }
            EventType::Warning => {
                warn!(target: "events", resource = %event.resource, reason = %event.reason, "{}", event.message)
            }
        }
    }
}

/// Sink that keeps events in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<Event>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Reasons of all recorded events, in order.
    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl EventSink for MemoryEventSink {
    fn publish(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

/// Publishes events for a single resource.
pub struct Recorder {
    sink: Arc<dyn EventSink>,
    resource: String,
}

impl Recorder {
    pub fn new(sink: Arc<dyn EventSink>, resource: &str) -> Self {
        Self {
            sink,
            resource: resource.to_string(),
        }
    }

    pub fn normal(&self, reason: &str, message: impl Into<String>) {
        self.publish(EventType::Normal, reason, message.into());
    }

    pub fn warning(&self, reason: &str, message: impl Into<String>) {
        self.publish(EventType::Warning, reason, message.into());
    }

    fn publish(&self, event_type: EventType, reason: &str, message: String) {
        self.sink.publish(Event {
            resource: self.resource.clone(),
            event_type,
            reason: reason.to_string(),
            message,
        });
    }
}
