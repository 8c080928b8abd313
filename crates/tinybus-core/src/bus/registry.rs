//! Registries for modules, subscriptions, routes and timers.
//!
//! All four live in one [`Registry`] behind a single lock owned by the bus.
//! The lock is held for container edits and snapshots only; callbacks are
//! cloned out and invoked after it is released.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::handler::{EventHandler, RequestHandler, TimerCallback, Transform};
use super::module::{ActionSchema, EventSchema, ModuleDescriptor};
use crate::error::{BusError, BusResult};
use crate::pattern;

/// Handle returned by [`Bus::subscribe`](super::Bus::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

/// Handle returned by the timer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Timer({})", self.0)
    }
}

pub(crate) struct ModuleEntry {
    pub(crate) name: String,
    pub(crate) handler: Option<Arc<dyn RequestHandler>>,
    pub(crate) actions: Vec<ActionSchema>,
    pub(crate) events: Vec<EventSchema>,
    /// Subscription created for the module's own event handler.
    pub(crate) subscription: Option<(SubscriptionId, String)>,
}

impl ModuleEntry {
    pub(crate) fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor {
            name: self.name.clone(),
            has_request_handler: self.handler.is_some(),
            event_pattern: self
                .subscription
                .as_ref()
                .map(|(_, pattern)| pattern.clone()),
            actions: self.actions.clone(),
            events: self.events.clone(),
        }
    }
}

pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) pattern: String,
    pub(crate) handler: Arc<dyn EventHandler>,
}

/// What a route does when its event pattern matches.
#[derive(Clone)]
pub(crate) enum RouteAction {
    /// Issue a fixed request with a payload copied at route creation.
    Static {
        request_pattern: Arc<str>,
        payload: Arc<[u8]>,
    },
    /// Compute the request from the triggering event.
    Transform(Arc<dyn Transform>),
}

pub(crate) struct Route {
    pub(crate) event_pattern: String,
    pub(crate) action: RouteAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Rearmed at `now + interval` after each firing.
    Repeating { interval: Duration },
    /// Fires once, then is reclaimed.
    OneShot,
}

pub(crate) struct Timer {
    pub(crate) id: TimerId,
    pub(crate) kind: TimerKind,
    /// `None` once a one-shot has fired.
    pub(crate) next_due: Option<Instant>,
    pub(crate) callback: Arc<dyn TimerCallback>,
}

/// The bus registries and their identity counters.
#[derive(Default)]
pub(crate) struct Registry {
    modules: Vec<ModuleEntry>,
    subscriptions: Vec<Subscription>,
    routes: Vec<Route>,
    timers: Vec<Timer>,
    next_subscription_id: u64,
    next_timer_id: u64,
}

fn reserve<T>(entries: &mut Vec<T>) -> BusResult<()> {
    entries.try_reserve(1).map_err(|_| BusError::NoMemory)
}

impl Registry {
    pub(crate) fn find_module(&self, name: &str) -> Option<&ModuleEntry> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Insert a module; names must be unique.
    pub(crate) fn insert_module(&mut self, entry: ModuleEntry) -> BusResult<()> {
        if self.find_module(&entry.name).is_some() {
            return Err(BusError::invalid_state(format!(
                "module '{}' already registered",
                entry.name
            )));
        }
        reserve(&mut self.modules)?;
        self.modules.push(entry);
        Ok(())
    }

    pub(crate) fn remove_module(&mut self, name: &str) -> Option<ModuleEntry> {
        let index = self.modules.iter().position(|m| m.name == name)?;
        Some(self.modules.remove(index))
    }

    pub(crate) fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name.clone()).collect()
    }

    pub(crate) fn request_handler(&self, name: &str) -> Option<Option<Arc<dyn RequestHandler>>> {
        self.find_module(name).map(|m| m.handler.clone())
    }

    pub(crate) fn add_subscription(
        &mut self,
        pattern: String,
        handler: Arc<dyn EventHandler>,
    ) -> BusResult<SubscriptionId> {
        reserve(&mut self.subscriptions)?;
        self.next_subscription_id += 1;
        let id = SubscriptionId(self.next_subscription_id);
        self.subscriptions.push(Subscription {
            id,
            pattern,
            handler,
        });
        Ok(id)
    }

    pub(crate) fn remove_subscription(&mut self, id: SubscriptionId) -> Option<Subscription> {
        let index = self.subscriptions.iter().position(|s| s.id == id)?;
        Some(self.subscriptions.remove(index))
    }

    /// Handlers of every subscription matching `key`, most recent first.
    pub(crate) fn matching_subscribers(&self, key: &str) -> Vec<Arc<dyn EventHandler>> {
        self.subscriptions
            .iter()
            .rev()
            .filter(|s| pattern::matches(&s.pattern, key))
            .map(|s| s.handler.clone())
            .collect()
    }

    pub(crate) fn add_route(&mut self, route: Route) -> BusResult<()> {
        reserve(&mut self.routes)?;
        self.routes.push(route);
        Ok(())
    }

    /// Remove routes registered for exactly `event_pattern`.
    ///
    /// With a request pattern only the static route issuing that exact
    /// request is removed; transform routes never match a request filter.
    pub(crate) fn remove_routes(
        &mut self,
        event_pattern: &str,
        request_pattern: Option<&str>,
    ) -> Vec<Route> {
        let (removed, kept): (Vec<Route>, Vec<Route>) = std::mem::take(&mut self.routes)
            .into_iter()
            .partition(|route| {
                route.event_pattern == event_pattern
                    && match (request_pattern, &route.action) {
                        (None, _) => true,
                        (Some(req), RouteAction::Static { request_pattern, .. }) => {
                            &**request_pattern == req
                        }
                        (Some(_), RouteAction::Transform(_)) => false,
                    }
            });
        self.routes = kept;
        removed
    }

    /// Actions of every route matching `key`, most recent first.
    pub(crate) fn matching_routes(&self, key: &str) -> Vec<RouteAction> {
        self.routes
            .iter()
            .rev()
            .filter(|r| pattern::matches(&r.event_pattern, key))
            .map(|r| r.action.clone())
            .collect()
    }

    pub(crate) fn add_timer(
        &mut self,
        kind: TimerKind,
        first_due: Instant,
        callback: Arc<dyn TimerCallback>,
    ) -> BusResult<TimerId> {
        reserve(&mut self.timers)?;
        self.next_timer_id += 1;
        let id = TimerId(self.next_timer_id);
        self.timers.push(Timer {
            id,
            kind,
            next_due: Some(first_due),
            callback,
        });
        Ok(id)
    }

    pub(crate) fn remove_timer(&mut self, id: TimerId) -> Option<Timer> {
        let index = self.timers.iter().position(|t| t.id == id)?;
        Some(self.timers.remove(index))
    }

    /// Time until the nearest armed timer, floored to `min_wait` and capped
    /// at `max_idle`.
    pub(crate) fn next_wait(&self, now: Instant, min_wait: Duration, max_idle: Duration) -> Duration {
        self.timers
            .iter()
            .filter_map(|t| t.next_due)
            .map(|due| due.saturating_duration_since(now).max(min_wait))
            .min()
            .map_or(max_idle, |wait| wait.min(max_idle))
    }

    /// Collect the callbacks of every timer due at `now`.
    ///
    /// Repeating timers are rearmed from `now`, so a stalled loop skips
    /// firings instead of bursting. Fired one-shots are reclaimed.
    pub(crate) fn take_due(&mut self, now: Instant) -> Vec<Arc<dyn TimerCallback>> {
        let mut due = Vec::new();
        for timer in self.timers.iter_mut().rev() {
            if !timer.next_due.is_some_and(|at| at <= now) {
                continue;
            }
            due.push(timer.callback.clone());
            timer.next_due = match timer.kind {
                TimerKind::Repeating { interval } => Some(now + interval),
                TimerKind::OneShot => None,
            };
        }
        self.timers.retain(|t| t.next_due.is_some());
        due
    }

    pub(crate) fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub(crate) fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub(crate) fn timer_count(&self) -> usize {
        self.timers.len()
    }
}
