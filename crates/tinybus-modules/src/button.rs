//! Button module
//!
//! Polls an input pin from a repeating bus timer, debounces it and turns
//! presses into events named `<button>:<event>`:
//! - `short_press` as soon as a press is recognised
//! - `double_press` when it follows the previous press within the window
//! - `long_press` once per press, after holding past the threshold
//! - `short_release` / `long_release` depending on whether the long press
//!   already fired

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use tinybus_core::{
    ActionSchema, Bus, BusError, BusResult, EventSchema, Module, Response, TimerId,
};

use crate::gpio::InputPin;

pub const GET_STATE: &str = "get_state";
pub const WAIT_PRESS: &str = "wait_press";
pub const WAIT_RELEASE: &str = "wait_release";
pub const CONFIG: &str = "config";

pub const SHORT_PRESS: &str = "short_press";
pub const LONG_PRESS: &str = "long_press";
pub const SHORT_RELEASE: &str = "short_release";
pub const LONG_RELEASE: &str = "long_release";
pub const DOUBLE_PRESS: &str = "double_press";

pub const ACTIONS: &[ActionSchema] = &[
    ActionSchema::new(GET_STATE, "none", "btn_state", "Get button state"),
    ActionSchema::new(WAIT_PRESS, "none", "none", "Block until pressed"),
    ActionSchema::new(WAIT_RELEASE, "none", "none", "Block until released"),
    ActionSchema::new(CONFIG, "btn_cfg", "none", "Reconfigure button timings"),
];

pub const EVENTS: &[EventSchema] = &[
    EventSchema::new(SHORT_PRESS, "none", "Short press (immediately on press)"),
    EventSchema::new(LONG_PRESS, "none", "Long press (while held >= long_press_ms)"),
    EventSchema::new(SHORT_RELEASE, "none", "Released before long press"),
    EventSchema::new(LONG_RELEASE, "none", "Released after long press"),
    EventSchema::new(DOUBLE_PRESS, "none", "Double press detected"),
];

/// Button configuration. Zero timings take the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    /// Pressed reads as a low level.
    pub active_low: bool,
    pub long_press_ms: u32,
    pub double_press_ms: u32,
    pub debounce_ms: u32,
    pub poll_interval_ms: u32,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            active_low: true,
            long_press_ms: 1000,
            double_press_ms: 300,
            debounce_ms: 20,
            poll_interval_ms: 10,
        }
    }
}

impl ButtonConfig {
    fn with_defaults(self) -> Self {
        let defaults = Self::default();
        let or_default = |value: u32, default: u32| if value > 0 { value } else { default };
        Self {
            active_low: self.active_low,
            long_press_ms: or_default(self.long_press_ms, defaults.long_press_ms),
            double_press_ms: or_default(self.double_press_ms, defaults.double_press_ms),
            debounce_ms: or_default(self.debounce_ms, defaults.debounce_ms),
            poll_interval_ms: or_default(self.poll_interval_ms, defaults.poll_interval_ms),
        }
    }
}

/// Body of a `config` request; omitted or zero fields keep their value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TimingUpdate {
    long_press_ms: u32,
    double_press_ms: u32,
    debounce_ms: u32,
}

/// Snapshot returned by `get_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ButtonState {
    pub pressed: bool,
    pub press_count: u32,
    /// Milliseconds since registration of the last press; 0 if none yet.
    pub last_press_ms: i64,
}

impl ButtonState {
    /// `pressed` (1 byte), `press_count` (u32 LE), `last_press_ms` (i64 LE).
    pub const ENCODED_LEN: usize = 13;

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0] = u8::from(self.pressed);
        out[1..5].copy_from_slice(&self.press_count.to_le_bytes());
        out[5..13].copy_from_slice(&self.last_press_ms.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; Self::ENCODED_LEN] = bytes.get(..Self::ENCODED_LEN)?.try_into().ok()?;
        let mut count = [0u8; 4];
        count.copy_from_slice(&bytes[1..5]);
        let mut last = [0u8; 8];
        last.copy_from_slice(&bytes[5..13]);
        Some(Self {
            pressed: bytes[0] != 0,
            press_count: u32::from_le_bytes(count),
            last_press_ms: i64::from_le_bytes(last),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ShortPress,
    DoublePress,
    LongPress,
    ShortRelease,
    LongRelease,
}

impl ButtonEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ButtonEvent::ShortPress => SHORT_PRESS,
            ButtonEvent::DoublePress => DOUBLE_PRESS,
            ButtonEvent::LongPress => LONG_PRESS,
            ButtonEvent::ShortRelease => SHORT_RELEASE,
            ButtonEvent::LongRelease => LONG_RELEASE,
        }
    }
}

/// Debounce and click classification over sampled levels.
///
/// Pure state machine: feed it `(time, pressed)` samples and it returns the
/// events each sample produces.
#[derive(Debug, Clone)]
pub struct ClickClassifier {
    long_press_ms: u64,
    double_press_ms: u64,
    debounce_ms: u64,
    pressed: bool,
    raw: bool,
    debounce_until: Option<u64>,
    press_started: Option<u64>,
    last_press: Option<u64>,
    long_fired: bool,
    press_count: u32,
}

impl ClickClassifier {
    /// Start from the level read at registration, without emitting anything
    /// for it.
    pub fn new(config: &ButtonConfig, initially_pressed: bool) -> Self {
        let config = config.with_defaults();
        Self {
            long_press_ms: u64::from(config.long_press_ms),
            double_press_ms: u64::from(config.double_press_ms),
            debounce_ms: u64::from(config.debounce_ms),
            pressed: initially_pressed,
            raw: initially_pressed,
            debounce_until: None,
            press_started: None,
            last_press: None,
            long_fired: false,
            press_count: 0,
        }
    }

    fn retime(&mut self, long_press_ms: u32, double_press_ms: u32, debounce_ms: u32) {
        if long_press_ms > 0 {
            self.long_press_ms = u64::from(long_press_ms);
        }
        if double_press_ms > 0 {
            self.double_press_ms = u64::from(double_press_ms);
        }
        if debounce_ms > 0 {
            self.debounce_ms = u64::from(debounce_ms);
        }
    }

    /// Feed one sample taken at `now_ms`.
    pub fn step(&mut self, now_ms: u64, pressed: bool) -> Vec<ButtonEvent> {
        let mut events = Vec::new();
        if self.debounce_until.is_some_and(|until| now_ms < until) {
            return events;
        }
        if pressed != self.raw {
            self.raw = pressed;
            self.debounce_until = Some(now_ms + self.debounce_ms);
            return events;
        }

        if pressed != self.pressed {
            self.pressed = pressed;
            if pressed {
                self.press_started = Some(now_ms);
                self.long_fired = false;
                self.press_count = self.press_count.wrapping_add(1);
                events.push(ButtonEvent::ShortPress);
                if self
                    .last_press
                    .is_some_and(|last| now_ms - last < self.double_press_ms)
                {
                    events.push(ButtonEvent::DoublePress);
                }
                self.last_press = Some(now_ms);
            } else {
                // A release with no recorded press is the startup level
                if self.press_started.take().is_none() {
                    return events;
                }
                events.push(if self.long_fired {
                    ButtonEvent::LongRelease
                } else {
                    ButtonEvent::ShortRelease
                });
            }
        }

        if self.pressed && !self.long_fired {
            if let Some(started) = self.press_started {
                if now_ms - started >= self.long_press_ms {
                    self.long_fired = true;
                    events.push(ButtonEvent::LongPress);
                }
            }
        }
        events
    }

    pub fn state(&self) -> ButtonState {
        ButtonState {
            pressed: self.pressed,
            press_count: self.press_count,
            last_press_ms: self.last_press.map_or(0, |t| t as i64),
        }
    }
}

struct ButtonInner {
    name: String,
    pin: Box<dyn InputPin>,
    active_low: bool,
    classifier: Mutex<ClickClassifier>,
    epoch: Instant,
}

impl ButtonInner {
    fn is_pressed(&self) -> bool {
        self.pin.is_high() != self.active_low
    }

    fn poll(&self, bus: &Bus) {
        let now = self.epoch.elapsed().as_millis() as u64;
        let events = self.classifier.lock().step(now, self.is_pressed());
        for event in events {
            debug!(button = %self.name, event = event.name(), "Button event");
            if let Err(e) = bus.emit(&self.name, event.name(), &[]) {
                warn!(button = %self.name, "Failed to emit {}: {}", event.name(), e);
            }
        }
    }

    fn handle(&self, action: &str, request: &[u8], response: &mut Response<'_>) -> BusResult<()> {
        match action {
            GET_STATE => {
                let state = self.classifier.lock().state();
                if response.fits(ButtonState::ENCODED_LEN) {
                    response.write(&state.encode());
                } else if response.fits(1) {
                    response.write(&[u8::from(state.pressed)]);
                }
                Ok(())
            }
            CONFIG => {
                if request.is_empty() {
                    return Ok(());
                }
                let update: TimingUpdate = serde_json::from_slice(request).map_err(|e| {
                    BusError::invalid_argument(format!("bad button config: {}", e))
                })?;
                self.classifier.lock().retime(
                    update.long_press_ms,
                    update.double_press_ms,
                    update.debounce_ms,
                );
                debug!(button = %self.name, "Button reconfigured");
                Ok(())
            }
            WAIT_PRESS | WAIT_RELEASE => Err(BusError::not_supported(format!(
                "'{}' would block the bus worker",
                action
            ))),
            other => Err(BusError::not_supported(format!("button action '{}'", other))),
        }
    }
}

/// A registered button.
#[derive(Debug)]
pub struct ButtonModule {
    name: String,
    poll_timer: TimerId,
}

impl ButtonModule {
    /// Register a button module called `name` reading `pin`, and start
    /// polling it.
    pub fn register(
        bus: &Bus,
        name: &str,
        pin: impl InputPin,
        config: ButtonConfig,
    ) -> BusResult<Self> {
        let config = config.with_defaults();
        let pin: Box<dyn InputPin> = Box::new(pin);
        let initially_pressed = pin.is_high() != config.active_low;
        let inner = Arc::new(ButtonInner {
            name: name.to_string(),
            pin,
            active_low: config.active_low,
            classifier: Mutex::new(ClickClassifier::new(&config, initially_pressed)),
            epoch: Instant::now(),
        });

        let handler = Arc::clone(&inner);
        bus.register(
            Module::new(name)
                .with_request_handler(
                    move |action: &str, request: &[u8], response: &mut Response<'_>| -> BusResult<()> {
                        handler.handle(action, request, response)
                    },
                )
                .with_actions(ACTIONS)
                .with_events(EVENTS),
        )?;

        let poller = Arc::clone(&inner);
        let handle = bus.clone();
        let interval = Duration::from_millis(u64::from(config.poll_interval_ms));
        let poll_timer = match bus.tick(interval, move || poller.poll(&handle)) {
            Ok(id) => id,
            Err(e) => {
                let _ = bus.unregister(name);
                return Err(e);
            }
        };

        info!(button = name, ?interval, "Button registered");
        Ok(Self {
            name: name.to_string(),
            poll_timer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop polling and remove the module from the bus.
    pub fn unregister(self, bus: &Bus) -> BusResult<()> {
        bus.cancel(self.poll_timer);
        bus.unregister(&self.name)?;
        info!(button = %self.name, "Button unregistered");
        Ok(())
    }
}
