//! # Bus Module
//!
//! A name-addressed message bus shared by independent modules. Modules expose
//! actions (`module.action`, request/response) and events (`module:event`,
//! fire-and-forget) and never reference each other directly.
//!
//! ## Overview
//!
//! - One worker thread runs every handler, subscriber, transform and timer
//! - Callers on other threads block on [`Bus::call`] until the worker answers
//! - Calls made from the worker itself run inline instead of being queued
//! - Routes turn matching events into requests without any glue code
//! - Repeating and one-shot timers share the worker's idle wait
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tinybus_core::{Bus, BusConfig, Module};
//!
//! let bus = Bus::new(BusConfig::default());
//! bus.init()?;
//!
//! bus.register(Module::new("echo").with_request_handler(
//!     |_action: &str, request: &[u8], response: &mut tinybus_core::Response<'_>| {
//!         response.write(request);
//!         Ok(())
//!     },
//! ))?;
//!
//! let mut buf = [0u8; 16];
//! let len = bus.call("echo.ping", b"hello", &mut buf, Duration::from_millis(100))?;
//! assert_eq!(&buf[..len], b"hello");
//!
//! // React to events from any button
//! let id = bus.subscribe("btn*:short_press", |event: &tinybus_core::Event<'_>| {
//!     println!("{} pressed", event.source);
//! })?;
//!
//! // Toggle an LED whenever btn1 is pressed
//! bus.on("btn1:short_press", "led1.toggle", &[])?;
//!
//! bus.unsubscribe(id);
//! bus.deinit()?;
//! ```

mod context;
mod envelope;
mod handler;
mod module;
mod registry;
mod request;
mod router;
mod timer;
mod worker;

pub use context::Bus;
pub use handler::*;
pub use module::{ActionSchema, EventSchema, Module, ModuleDescriptor};
pub use registry::{SubscriptionId, TimerId};
pub use request::{NO_WAIT, WAIT_FOREVER};
