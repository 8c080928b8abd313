//! Module definitions and introspection.

use serde::Serialize;
use std::sync::Arc;

use super::handler::{EventHandler, RequestHandler};

/// Declares one action a module offers. Advisory only; never enforced at
/// dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionSchema {
    /// Action name, as used after the `.` of a request pattern.
    pub name: &'static str,
    /// Type tag of the request payload.
    pub request_type: &'static str,
    /// Type tag of the response.
    pub response_type: &'static str,
    /// Human-readable description.
    pub description: &'static str,
}

impl ActionSchema {
    pub const fn new(
        name: &'static str,
        request_type: &'static str,
        response_type: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            request_type,
            response_type,
            description,
        }
    }
}

/// Declares one event a module emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventSchema {
    /// Event name, as used after the `:` of an event key.
    pub name: &'static str,
    /// Type tag of the payload.
    pub payload_type: &'static str,
    /// Human-readable description.
    pub description: &'static str,
}

impl EventSchema {
    pub const fn new(
        name: &'static str,
        payload_type: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            payload_type,
            description,
        }
    }
}

/// A module ready to be registered with [`Bus::register`](super::Bus::register).
///
/// Names longer than the configured maximum are truncated on registration.
pub struct Module {
    pub(crate) name: String,
    pub(crate) request_handler: Option<Arc<dyn RequestHandler>>,
    pub(crate) event_handler: Option<(String, Arc<dyn EventHandler>)>,
    pub(crate) actions: Vec<ActionSchema>,
    pub(crate) events: Vec<EventSchema>,
}

impl Module {
    /// Create a module with no handlers and no schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request_handler: None,
            event_handler: None,
            actions: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Service `name.<action>` requests with `handler`.
    pub fn with_request_handler(mut self, handler: impl RequestHandler) -> Self {
        self.request_handler = Some(Arc::new(handler));
        self
    }

    /// Deliver events matching `pattern` to `handler` for as long as the
    /// module stays registered.
    pub fn with_event_handler(
        mut self,
        pattern: impl Into<String>,
        handler: impl EventHandler,
    ) -> Self {
        self.event_handler = Some((pattern.into(), Arc::new(handler)));
        self
    }

    /// Publish the actions this module services.
    pub fn with_actions(mut self, actions: &[ActionSchema]) -> Self {
        self.actions = actions.to_vec();
        self
    }

    /// Publish the events this module emits.
    pub fn with_events(mut self, events: &[EventSchema]) -> Self {
        self.events = events.to_vec();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("request_handler", &self.request_handler.is_some())
            .field(
                "event_pattern",
                &self.event_handler.as_ref().map(|(pattern, _)| pattern),
            )
            .field("actions", &self.actions.len())
            .field("events", &self.events.len())
            .finish()
    }
}

/// Snapshot of a registered module, for introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub has_request_handler: bool,
    /// Pattern of the module's own event subscription, if any.
    pub event_pattern: Option<String>,
    pub actions: Vec<ActionSchema>,
    pub events: Vec<EventSchema>,
}
