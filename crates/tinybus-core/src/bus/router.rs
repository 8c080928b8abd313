//! Event fan-out and event-to-request routing.
//!
//! Emitting only queues the event. On the worker, every matching subscriber
//! runs first, then every matching route issues its request inline, so
//! event→request chains finish within one dispatch while events emitted by
//! handlers wait their turn in the queue.

use crossbeam_channel::TrySendError;
use std::sync::Arc;
use tracing::debug;

use super::context::Bus;
use super::envelope::{copy_payload, Envelope};
use super::handler::{Event, EventHandler, Transform};
use super::registry::{Route, RouteAction, SubscriptionId};
use crate::error::{BusError, BusResult};
use crate::pattern;

impl Bus {
    /// Queue `source:event` with a copy of `payload`. Never blocks; a full
    /// queue fails with `Timeout`.
    pub fn emit(&self, source: &str, event: &str, payload: &[u8]) -> BusResult<()> {
        if source.is_empty() || event.is_empty() {
            return Err(BusError::invalid_argument(
                "event source and name must not be empty",
            ));
        }
        let (queue, _) = self.sender()?;
        let envelope = Envelope::Event {
            source: source.to_string(),
            name: event.to_string(),
            payload: copy_payload(payload)?,
        };
        match queue.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!(source, event, "EVT dropped: queue full");
                Err(BusError::Timeout)
            }
            Err(TrySendError::Disconnected(_)) => Err(BusError::not_initialized()),
        }
    }

    /// Deliver events whose `source:event` key matches `pattern`.
    pub fn subscribe(&self, pattern: &str, handler: impl EventHandler) -> BusResult<SubscriptionId> {
        if pattern.is_empty() {
            return Err(BusError::invalid_argument("empty subscription pattern"));
        }
        self.ensure_init()?;
        let pattern = pattern::truncate(pattern, self.config().max_pattern_len).to_string();
        let id = self
            .shared
            .registry
            .lock()
            .add_subscription(pattern.clone(), Arc::new(handler))?;
        debug!(%id, %pattern, "Subscription added");
        Ok(id)
    }

    /// Returns true if the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.shared.registry.lock().remove_subscription(id);
        match removed {
            Some(subscription) => {
                debug!(%id, pattern = %subscription.pattern, "Subscription removed");
                true
            }
            None => false,
        }
    }

    /// Route events matching `event_pattern` to a fixed request.
    ///
    /// `payload` is copied now and sent with every routed request.
    pub fn on(&self, event_pattern: &str, request_pattern: &str, payload: &[u8]) -> BusResult<()> {
        if request_pattern.is_empty() {
            return Err(BusError::invalid_argument("empty request pattern"));
        }
        let action = RouteAction::Static {
            request_pattern: Arc::from(request_pattern),
            payload: Arc::from(copy_payload(payload)?),
        };
        self.add_route(event_pattern, action)?;
        debug!(event = event_pattern, request = request_pattern, "Route added");
        Ok(())
    }

    /// Route events matching `event_pattern` through `transform`, which
    /// builds the request for each event.
    pub fn on_fn(&self, event_pattern: &str, transform: impl Transform) -> BusResult<()> {
        self.add_route(event_pattern, RouteAction::Transform(Arc::new(transform)))?;
        debug!(event = event_pattern, "Transform route added");
        Ok(())
    }

    /// Remove the routes added for exactly `event_pattern`; with
    /// `request_pattern`, only the static route issuing that request.
    ///
    /// Returns how many routes were removed.
    pub fn off(&self, event_pattern: &str, request_pattern: Option<&str>) -> BusResult<usize> {
        if event_pattern.is_empty() {
            return Err(BusError::invalid_argument("empty event pattern"));
        }
        self.ensure_init()?;
        let event_pattern = pattern::truncate(event_pattern, self.config().max_pattern_len);
        let removed = self
            .shared
            .registry
            .lock()
            .remove_routes(event_pattern, request_pattern);
        debug!(
            event = event_pattern,
            request = request_pattern.unwrap_or("*"),
            removed = removed.len(),
            "Routes removed"
        );
        Ok(removed.len())
    }

    fn add_route(&self, event_pattern: &str, action: RouteAction) -> BusResult<()> {
        if event_pattern.is_empty() {
            return Err(BusError::invalid_argument("empty event pattern"));
        }
        self.ensure_init()?;
        let route = Route {
            event_pattern: pattern::truncate(event_pattern, self.config().max_pattern_len)
                .to_string(),
            action,
        };
        self.shared.registry.lock().add_route(route)
    }

    /// Fan an event out on the worker: subscribers first, then routes.
    pub(crate) fn dispatch_event(&self, source: &str, name: &str, payload: &[u8]) {
        let key = pattern::event_key(source, name, self.config().max_pattern_len);
        let (subscribers, routes) = {
            let registry = self.shared.registry.lock();
            (
                registry.matching_subscribers(&key),
                registry.matching_routes(&key),
            )
        };
        debug!(
            event = %key,
            len = payload.len(),
            subscribers = subscribers.len(),
            routes = routes.len(),
            "EVT"
        );

        let event = Event {
            source,
            name,
            payload,
        };
        for handler in subscribers {
            self.guard(&key, || handler.on_event(&event));
        }
        for route in routes {
            match route {
                RouteAction::Static {
                    request_pattern,
                    payload,
                } => {
                    debug!(event = %key, request = %request_pattern, "ROUTE");
                    self.process_detached(&request_pattern, &payload);
                }
                RouteAction::Transform(transform) => {
                    let Some(routed) = self.guard(&key, || transform.transform(&event)).flatten()
                    else {
                        continue;
                    };
                    debug!(event = %key, request = %routed.pattern, "ROUTE");
                    self.process_detached(&routed.pattern, &routed.payload);
                }
            }
        }
    }
}
