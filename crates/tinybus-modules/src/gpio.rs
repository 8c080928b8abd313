//! Digital pin abstraction
//!
//! Modules talk to hardware only through these traits, so the same module
//! code drives a real GPIO driver or a [`SimulatedPin`] in tests and demos.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A digital input.
pub trait InputPin: Send + Sync + 'static {
    /// Current electrical level; `true` is high.
    fn is_high(&self) -> bool;
}

/// A digital output.
pub trait OutputPin: Send + Sync + 'static {
    /// Drive the pin high (`true`) or low.
    fn set_level(&self, high: bool);
}

/// In-memory pin usable as either input or output.
///
/// Clones share the same level, so a test keeps one clone to drive or
/// observe the pin while a module owns another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPin {
    level: Arc<AtomicBool>,
}

impl SimulatedPin {
    /// Create a pin at the given level.
    pub fn new(high: bool) -> Self {
        Self {
            level: Arc::new(AtomicBool::new(high)),
        }
    }

    /// Force the level, as external hardware would.
    pub fn set(&self, high: bool) {
        self.level.store(high, Ordering::SeqCst);
    }

    pub fn level(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }
}

impl InputPin for SimulatedPin {
    fn is_high(&self) -> bool {
        self.level()
    }
}

impl OutputPin for SimulatedPin {
    fn set_level(&self, high: bool) {
        self.set(high);
    }
}
