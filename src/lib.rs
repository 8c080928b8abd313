//! # tinybus
//!
//! An in-process, name-addressed message bus for small devices:
//! - Modules register under a short name and answer `module.action` requests
//! - Events named `module:event` fan out to wildcard subscribers
//! - Routes turn events into requests without glue code
//! - A single worker thread runs dispatch and a shared timer service
//!
//! ## Architecture
//!
//! The workspace is split into:
//!
//! 1. **tinybus-core** - Bus engine, patterns, registries, timers, config
//! 2. **tinybus-modules** - Button and LED modules over a pin abstraction
//! 3. **tinybus** - This crate: re-exports, logging setup and the demo binary

pub use tinybus_core::{bus, config, error, pattern};
pub use tinybus_modules::{button, gpio, led};

pub use tinybus_core::{
    ActionSchema, Bus, BusConfig, BusError, BusResult, ConfigError, ErrorKind, Event,
    EventHandler, EventSchema, Module, ModuleDescriptor, RequestHandler, Response, RoutedRequest,
    SubscriptionId, TimerCallback, TimerId, Transform, NO_WAIT, WAIT_FOREVER,
};

pub use tinybus_modules::{
    ButtonConfig, ButtonEvent, ButtonModule, ButtonState, InputPin, LedConfig, LedModule,
    OutputPin, SimulatedPin,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output, pretty by default or JSON when `TINYBUS_LOG_FORMAT=json`
/// - RUST_LOG environment variable support (defaults to `info`)
/// - Thread ids and names, so worker output stands apart from callers
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("TINYBUS_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_thread_names(true)
            .json();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(true)
            .pretty();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}
