//! # tinybus Core
//!
//! The bus engine behind tinybus: pattern matching, the registries for
//! modules, subscriptions, routes and timers, the single-consumer dispatch
//! loop, the blocking request bridge, event routing and the timer scheduler.
//! Provides the error and configuration models shared by every module.

pub mod bus;
pub mod config;
pub mod error;
pub mod pattern;

pub use bus::{
    ActionSchema, Bus, ErrorCallback, Event, EventHandler, EventSchema, Module, ModuleDescriptor,
    RequestHandler, Response, RoutedRequest, SubscriptionId, TimerCallback, TimerId, Transform,
    NO_WAIT, WAIT_FOREVER,
};
pub use config::{BusConfig, ConfigError, ConfigResult};
pub use error::{BusError, BusResult, ErrorKind};
