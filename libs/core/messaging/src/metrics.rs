//! Prometheus-style counters for the event bus.
//!
//! Emitted through the `metrics` facade; nothing is recorded unless the
//! binary installs a recorder.

use metrics::{counter, histogram};
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct BusMetrics {
    transport: &'static str,
}

impl BusMetrics {
    pub fn new(transport: &'static str) -> Self {
        Self { transport }
    }

    pub fn published(&self, event_type: &str) {
        counter!(
            "event_bus_published_total",
            "transport" => self.transport,
            "event_type" => event_type.to_string()
        )
        .increment(1);
    }

    pub fn publish_failed(&self, event_type: &str) {
        counter!(
            "event_bus_publish_failures_total",
            "transport" => self.transport,
            "event_type" => event_type.to_string()
        )
        .increment(1);
    }

    pub fn dropped(&self, channel: &str, reason: &'static str) {
        counter!(
            "event_bus_dropped_total",
            "transport" => self.transport,
            "channel" => channel.to_string(),
            "reason" => reason
        )
        .increment(1);
    }

    pub fn handled(&self, event_type: &str, handler: &'static str, duration: Duration) {
        counter!(
            "event_bus_handled_total",
            "event_type" => event_type.to_string(),
            "handler" => handler
        )
        .increment(1);

        histogram!(
            "event_bus_handler_duration_seconds",
            "event_type" => event_type.to_string(),
            "handler" => handler
        )
        .record(duration.as_secs_f64());
    }

    pub fn handler_failed(&self, event_type: &str, handler: &'static str, kind: &'static str) {
        counter!(
            "event_bus_handler_failures_total",
            "event_type" => event_type.to_string(),
            "handler" => handler,
            "kind" => kind
        )
        .increment(1);
    }
}
