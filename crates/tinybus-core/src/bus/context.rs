//! Bus context: lifecycle, module registry access and runtime settings.

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::envelope::Envelope;
use super::handler::ErrorCallback;
use super::module::{Module, ModuleDescriptor};
use super::registry::{ModuleEntry, Registry};
use super::worker;
use crate::config::BusConfig;
use crate::error::{BusError, BusResult};
use crate::pattern;

/// Everything that exists only between `init` and `deinit`.
pub(crate) struct Runtime {
    queue: Sender<Envelope>,
    /// Never sent on; dropping it stops the worker.
    shutdown: Sender<()>,
    worker: JoinHandle<()>,
    worker_id: ThreadId,
}

pub(crate) struct BusShared {
    config: BusConfig,
    pub(crate) registry: Mutex<Registry>,
    runtime: RwLock<Option<Runtime>>,
    strict: AtomicBool,
    on_error: RwLock<Option<ErrorCallback>>,
    epoch: Instant,
}

/// Handle to a message bus.
///
/// Cloning is cheap and every clone refers to the same bus. Handlers that
/// capture a clone keep the bus alive until [`Bus::deinit`] clears the
/// registries, so a bus should always be torn down explicitly.
#[derive(Clone)]
pub struct Bus {
    pub(crate) shared: Arc<BusShared>,
}

impl Bus {
    /// Create an uninitialized bus with the given configuration.
    pub fn new(config: BusConfig) -> Self {
        let strict = config.strict;
        Self {
            shared: Arc::new(BusShared {
                config,
                registry: Mutex::new(Registry::default()),
                runtime: RwLock::new(None),
                strict: AtomicBool::new(strict),
                on_error: RwLock::new(None),
                epoch: Instant::now(),
            }),
        }
    }

    pub(crate) fn upgrade(shared: &Weak<BusShared>) -> Option<Self> {
        shared.upgrade().map(|shared| Self { shared })
    }

    /// Create the queue and start the worker.
    ///
    /// Calling this on a running bus does nothing.
    pub fn init(&self) -> BusResult<()> {
        let mut runtime = self.shared.runtime.write();
        if runtime.is_some() {
            return Ok(());
        }
        let config = &self.shared.config;
        config.validate()?;

        let (queue, queue_rx) = crossbeam_channel::bounded(config.queue_capacity);
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded(0);
        let weak = Arc::downgrade(&self.shared);
        let worker = thread::Builder::new()
            .name(config.worker_name.clone())
            .stack_size(config.worker_stack_size)
            .spawn(move || worker::run(weak, queue_rx, shutdown_rx))
            .map_err(|e| {
                error!("Failed to spawn bus worker: {}", e);
                BusError::NoMemory
            })?;
        let worker_id = worker.thread().id();

        *runtime = Some(Runtime {
            queue,
            shutdown,
            worker,
            worker_id,
        });
        info!(
            queue_capacity = config.queue_capacity,
            worker = %config.worker_name,
            "Bus initialized"
        );
        Ok(())
    }

    /// Stop the worker and release every registered entry.
    ///
    /// Envelopes still queued are dropped; blocked callers get an error.
    /// When called from a handler the worker finishes its current envelope
    /// and exits without being joined.
    pub fn deinit(&self) -> BusResult<()> {
        let runtime = self
            .shared
            .runtime
            .write()
            .take()
            .ok_or_else(BusError::not_initialized)?;
        let Runtime {
            queue,
            shutdown,
            worker,
            worker_id,
        } = runtime;
        drop(shutdown);
        drop(queue);

        if thread::current().id() != worker_id && worker.join().is_err() {
            warn!("Bus worker exited by panic");
        }

        // Entries may hold bus handles; drop them outside the lock.
        let released = std::mem::take(&mut *self.shared.registry.lock());
        drop(released);
        info!("Bus deinitialized");
        Ok(())
    }

    pub fn is_init(&self) -> bool {
        self.shared.runtime.read().is_some()
    }

    /// Configuration the bus was created with.
    pub fn config(&self) -> &BusConfig {
        &self.shared.config
    }

    /// Choose whether requests to unknown modules fail or are dropped.
    pub fn set_strict(&self, strict: bool) {
        self.shared.strict.store(strict, Ordering::Relaxed);
    }

    pub fn is_strict(&self) -> bool {
        self.shared.strict.load(Ordering::Relaxed)
    }

    /// Observe failures that have no caller to return to.
    ///
    /// The callback receives the pattern involved and the error. It runs on
    /// whichever thread hit the failure, usually the worker.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&str, &BusError) + Send + Sync + 'static,
    {
        *self.shared.on_error.write() = Some(Arc::new(callback));
    }

    /// Register a module.
    ///
    /// Fails with `InvalidArgument` for an empty name or one containing a
    /// separator, and with `InvalidState` if the name is taken.
    pub fn register(&self, module: Module) -> BusResult<()> {
        self.ensure_init()?;
        let Module {
            name,
            request_handler,
            event_handler,
            actions,
            events,
        } = module;
        if name.is_empty() || name.contains(['.', ':']) {
            return Err(BusError::invalid_argument(format!(
                "invalid module name '{}'",
                name
            )));
        }
        let config = self.config();
        let name = pattern::truncate(&name, config.max_name_len).to_string();

        let mut registry = self.shared.registry.lock();
        if registry.find_module(&name).is_some() {
            return Err(BusError::invalid_state(format!(
                "module '{}' already registered",
                name
            )));
        }
        let subscription = match event_handler {
            Some((event_pattern, handler)) => {
                let event_pattern =
                    pattern::truncate(&event_pattern, config.max_pattern_len).to_string();
                let id = registry.add_subscription(event_pattern.clone(), handler)?;
                Some((id, event_pattern))
            }
            None => None,
        };
        let owned = subscription.as_ref().map(|(id, _)| *id);
        let entry = ModuleEntry {
            name: name.clone(),
            handler: request_handler,
            actions,
            events,
            subscription,
        };
        if let Err(err) = registry.insert_module(entry) {
            if let Some(id) = owned {
                registry.remove_subscription(id);
            }
            return Err(err);
        }
        drop(registry);

        info!(module = %name, "Module registered");
        Ok(())
    }

    /// Remove a module and its event subscription.
    pub fn unregister(&self, name: &str) -> BusResult<()> {
        self.ensure_init()?;
        let name = pattern::truncate(name, self.config().max_name_len);
        let released = {
            let mut registry = self.shared.registry.lock();
            let entry = registry
                .remove_module(name)
                .ok_or_else(|| BusError::not_found(format!("module '{}'", name)))?;
            let subscription = entry
                .subscription
                .as_ref()
                .and_then(|(id, _)| registry.remove_subscription(*id));
            (entry, subscription)
        };
        drop(released);
        info!(module = %name, "Module unregistered");
        Ok(())
    }

    /// Whether a module with this name is registered.
    pub fn exists(&self, name: &str) -> bool {
        self.with_module(name, |_| true).unwrap_or(false)
    }

    /// Whether the module publishes an action with this name.
    pub fn has_action(&self, module: &str, action: &str) -> bool {
        self.with_module(module, |m| m.actions.iter().any(|a| a.name == action))
            .unwrap_or(false)
    }

    /// Whether the module publishes an event with this name.
    pub fn has_event(&self, module: &str, event: &str) -> bool {
        self.with_module(module, |m| m.events.iter().any(|e| e.name == event))
            .unwrap_or(false)
    }

    /// Introspection snapshot of a registered module.
    pub fn describe(&self, name: &str) -> Option<ModuleDescriptor> {
        self.with_module(name, ModuleEntry::descriptor)
    }

    /// Names of all registered modules, in registration order.
    pub fn modules(&self) -> Vec<String> {
        if !self.is_init() {
            return Vec::new();
        }
        self.shared.registry.lock().module_names()
    }

    pub fn module_count(&self) -> usize {
        self.shared.registry.lock().module_count()
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.registry.lock().subscription_count()
    }

    pub fn route_count(&self) -> usize {
        self.shared.registry.lock().route_count()
    }

    pub fn timer_count(&self) -> usize {
        self.shared.registry.lock().timer_count()
    }

    fn with_module<T>(&self, name: &str, f: impl FnOnce(&ModuleEntry) -> T) -> Option<T> {
        if !self.is_init() {
            return None;
        }
        let name = pattern::truncate(name, self.config().max_name_len);
        self.shared.registry.lock().find_module(name).map(f)
    }

    pub(crate) fn ensure_init(&self) -> BusResult<()> {
        if self.is_init() {
            Ok(())
        } else {
            Err(BusError::not_initialized())
        }
    }

    /// The queue sender and the worker's identity.
    pub(crate) fn sender(&self) -> BusResult<(Sender<Envelope>, ThreadId)> {
        self.shared
            .runtime
            .read()
            .as_ref()
            .map(|rt| (rt.queue.clone(), rt.worker_id))
            .ok_or_else(BusError::not_initialized)
    }

    /// Queue a wake without blocking and without touching the registry.
    ///
    /// Returns false if the bus is stopped, busy being started or stopped,
    /// or the queue is full.
    pub(crate) fn try_wake(&self) -> bool {
        let Some(runtime) = self.shared.runtime.try_read() else {
            return false;
        };
        runtime
            .as_ref()
            .is_some_and(|rt| rt.queue.try_send(Envelope::Wake).is_ok())
    }

    /// Scheduling ticks elapsed since the bus was created.
    pub(crate) fn current_tick(&self) -> u64 {
        let period = self.config().tick_period().as_millis().max(1);
        (self.shared.epoch.elapsed().as_millis() / period) as u64
    }

    /// Log a failure and hand it to the error callback.
    pub(crate) fn report_error(&self, pattern: &str, err: &BusError) {
        warn!(pattern, kind = %err.kind(), "{}", err);
        let callback = self.shared.on_error.read().clone();
        if let Some(callback) = callback {
            callback(pattern, err);
        }
    }

    /// Run a user callback, reporting a panic instead of unwinding into the
    /// worker loop.
    pub(crate) fn guard<T>(&self, pattern: &str, f: impl FnOnce() -> T) -> Option<T> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                self.report_error(pattern, &panic_error(pattern, payload.as_ref()));
                None
            }
        }
    }
}

pub(crate) fn panic_error(pattern: &str, payload: &(dyn Any + Send)) -> BusError {
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic");
    debug!(pattern, "Callback panicked: {}", message);
    BusError::failed(format!("callback for '{}' panicked: {}", pattern, message))
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("initialized", &self.is_init())
            .field("strict", &self.is_strict())
            .field("modules", &self.module_count())
            .field("config", &self.shared.config)
            .finish()
    }
}
