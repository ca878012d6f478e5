//! Stack event tracking while a stack settles

use albflow_template::StackEvent;
use aws_sdk_cloudformation::primitives::DateTime as SmithyDateTime;
use aws_sdk_cloudformation::types;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Events seen so far for one operation, oldest first
#[derive(Debug, Default)]
pub struct EventLog {
    seen: HashSet<String>,
    events: Vec<StackEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark events that happened before the operation started
    pub fn ignore(&mut self, event_id: impl Into<String>) {
        self.seen.insert(event_id.into());
    }

    /// Record an event; returns false if it was already seen
    pub fn observe(&mut self, event_id: impl Into<String>, event: StackEvent) -> bool {
        if !self.seen.insert(event_id.into()) {
            return false;
        }
        tracing::info!("{}", event);
        self.events.push(event);
        true
    }

    pub fn events(&self) -> &[StackEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<StackEvent> {
        self.events
    }
}

pub fn to_chrono(value: &SmithyDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

/// Convert an SDK event; `None` if it has no id
pub fn convert_event(event: &types::StackEvent) -> Option<(String, StackEvent)> {
    let id = event.event_id()?.to_string();
    Some((
        id,
        StackEvent {
            timestamp: event.timestamp().and_then(to_chrono).unwrap_or_else(Utc::now),
            logical_id: event.logical_resource_id().unwrap_or_default().to_string(),
            resource_type: event.resource_type().unwrap_or_default().to_string(),
            status: event
                .resource_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            reason: event.resource_status_reason().map(str::to_string),
        },
    ))
}

/// Whether an API error message means the stack is absent
pub fn is_missing_stack(message: &str) -> bool {
    message.contains("does not exist")
}

/// Whether an UpdateStack error message means there is nothing to change
pub fn is_no_op_update(message: &str) -> bool {
    message.contains("No updates are to be performed")
}
