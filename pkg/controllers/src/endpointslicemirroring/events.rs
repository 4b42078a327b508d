use pkg_types::endpoint::Endpoints;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// Sink for events attached to an Endpoints object.
pub trait EventRecorder: Send + Sync {
    fn event(&self, endpoints: &Endpoints, event_type: EventType, reason: &str, message: &str);

    fn warning(&self, endpoints: &Endpoints, reason: &str, message: &str) {
        self.event(endpoints, EventType::Warning, reason, message);
    }
}

/// Records events as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventRecorder;

impl EventRecorder for TracingEventRecorder {
    fn event(&self, endpoints: &Endpoints, event_type: EventType, reason: &str, message: &str) {
        match event_type {
            EventType::Normal => info!(
                endpoints = %endpoints.key(),
                reason,
                "{}", message
            ),
            EventType::Warning => warn!(
                endpoints = %endpoints.key(),
                reason,
                "{}", message
            ),
        }
    }
}
