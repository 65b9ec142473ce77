//! Event-notification boundary.
//!
//! The embedding orchestration tool owns event delivery; the driver only
//! announces lifecycle milestones through this trait. Notification is fire
//! and forget: a sink must never fail the operation that emitted the event.

use serde_json::Value;

/// Sink for lifecycle notifications.
pub trait EventSink: Send + Sync {
    /// Delivers one event with its payload.
    fn notify(&self, event: &str, payload: Value);
}

/// Default sink that records events on the `tracing` subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn notify(&self, event: &str, payload: Value) {
        tracing::info!(event, payload = %payload, "lifecycle event");
    }
}
