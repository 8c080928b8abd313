//! LED module
//!
//! Drives an output pin from `on` / `off` / `toggle` / `blink` requests.
//! Blinking is a chain of one-shot bus timers; every chain carries a
//! generation number so a firing that raced with a stop is ignored.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use tinybus_core::{ActionSchema, Bus, BusError, BusResult, Module, Response, TimerId};

use crate::gpio::OutputPin;

pub const ON: &str = "on";
pub const OFF: &str = "off";
pub const TOGGLE: &str = "toggle";
pub const BLINK: &str = "blink";
pub const PATTERN: &str = "pattern";
pub const GET_STATE: &str = "get_state";

pub const ACTIONS: &[ActionSchema] = &[
    ActionSchema::new(ON, "none", "none", "Turn LED on"),
    ActionSchema::new(OFF, "none", "none", "Turn LED off"),
    ActionSchema::new(TOGGLE, "none", "none", "Toggle LED state"),
    ActionSchema::new(BLINK, "string", "none", "Blink LED: 'on_ms,off_ms[,count]'"),
    ActionSchema::new(PATTERN, "string", "none", "LED pattern: 't1,t2,t3,...'"),
    ActionSchema::new(GET_STATE, "none", "uint8", "Get LED state (0/1)"),
];

const DEFAULT_PHASE_MS: u16 = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    /// On drives the pin low.
    pub active_low: bool,
}

/// Parsed `blink` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkParams {
    pub on_ms: u16,
    pub off_ms: u16,
    /// Number of blinks; negative blinks forever, zero stops.
    pub count: i16,
}

impl Default for BlinkParams {
    fn default() -> Self {
        Self {
            on_ms: DEFAULT_PHASE_MS,
            off_ms: DEFAULT_PHASE_MS,
            count: -1,
        }
    }
}

impl BlinkParams {
    /// Parse `"on_ms,off_ms[,count]"`. Missing fields keep their default
    /// and parsing stops at the first field that is not a number.
    pub fn parse(text: &str) -> Self {
        let mut params = Self::default();
        let text = text.trim_end_matches('\0');
        let mut fields = text.split(',').map(str::trim);

        let Some(on_ms) = fields.next().and_then(|f| f.parse().ok()) else {
            return params;
        };
        params.on_ms = on_ms;
        let Some(off_ms) = fields.next().and_then(|f| f.parse().ok()) else {
            return params;
        };
        params.off_ms = off_ms;
        if let Some(count) = fields.next().and_then(|f| f.parse().ok()) {
            params.count = count;
        }
        params
    }
}

#[derive(Debug, Default)]
struct LedState {
    on: bool,
    /// Phase changes left; -1 blinks forever.
    remaining: i32,
    on_ms: u16,
    off_ms: u16,
    timer: Option<TimerId>,
    generation: u64,
}

struct LedInner {
    name: String,
    pin: Box<dyn OutputPin>,
    active_low: bool,
    state: Mutex<LedState>,
}

impl LedInner {
    fn drive(&self, state: &mut LedState, on: bool) {
        state.on = on;
        self.pin.set_level(on != self.active_low);
    }

    fn stop_blink(&self, bus: &Bus, state: &mut LedState) {
        state.generation = state.generation.wrapping_add(1);
        state.remaining = 0;
        if let Some(id) = state.timer.take() {
            bus.cancel(id);
        }
    }

    fn start_blink(self: &Arc<Self>, bus: &Bus, params: BlinkParams) -> BusResult<()> {
        let mut state = self.state.lock();
        self.stop_blink(bus, &mut state);
        if params.count == 0 {
            return Ok(());
        }

        state.on_ms = if params.on_ms > 0 { params.on_ms } else { DEFAULT_PHASE_MS };
        state.off_ms = if params.off_ms > 0 { params.off_ms } else { DEFAULT_PHASE_MS };
        state.remaining = if params.count < 0 {
            -1
        } else {
            i32::from(params.count) * 2
        };
        self.drive(&mut state, true);

        let delay = Duration::from_millis(u64::from(state.on_ms));
        let id = self.schedule(bus, delay, state.generation)?;
        state.timer = Some(id);
        debug!(led = %self.name, ?params, "Blink started");
        Ok(())
    }

    fn schedule(self: &Arc<Self>, bus: &Bus, delay: Duration, generation: u64) -> BusResult<TimerId> {
        let led = Arc::clone(self);
        let handle = bus.clone();
        bus.after(delay, move || led.blink_step(&handle, generation))
    }

    fn blink_step(self: &Arc<Self>, bus: &Bus, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        state.timer = None;

        if state.remaining > 0 {
            state.remaining -= 1;
            if state.remaining == 0 {
                self.drive(&mut state, false);
                debug!(led = %self.name, "Blink finished");
                return;
            }
        }
        let on = !state.on;
        self.drive(&mut state, on);

        let phase = if on { state.on_ms } else { state.off_ms };
        match self.schedule(bus, Duration::from_millis(u64::from(phase)), generation) {
            Ok(id) => state.timer = Some(id),
            Err(e) => warn!(led = %self.name, "Failed to schedule blink step: {}", e),
        }
    }

    fn handle(
        self: &Arc<Self>,
        bus: &Bus,
        action: &str,
        request: &[u8],
        response: &mut Response<'_>,
    ) -> BusResult<()> {
        match action {
            ON | OFF | TOGGLE => {
                let mut state = self.state.lock();
                self.stop_blink(bus, &mut state);
                let on = match action {
                    ON => true,
                    OFF => false,
                    _ => !state.on,
                };
                self.drive(&mut state, on);
                Ok(())
            }
            BLINK => {
                let text = std::str::from_utf8(request)
                    .map_err(|_| BusError::invalid_argument("blink parameters are not UTF-8"))?;
                self.start_blink(bus, BlinkParams::parse(text))
            }
            GET_STATE => {
                let on = self.state.lock().on;
                response.write(&[u8::from(on)]);
                Ok(())
            }
            other => Err(BusError::not_supported(format!("led action '{}'", other))),
        }
    }
}

/// A registered LED.
#[derive(Debug)]
pub struct LedModule {
    name: String,
    inner: Arc<LedInner>,
}

impl std::fmt::Debug for LedInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedInner")
            .field("name", &self.name)
            .field("active_low", &self.active_low)
            .finish_non_exhaustive()
    }
}

impl LedModule {
    /// Register an LED module called `name` driving `pin`. The LED starts off.
    pub fn register(bus: &Bus, name: &str, pin: impl OutputPin, config: LedConfig) -> BusResult<Self> {
        let inner = Arc::new(LedInner {
            name: name.to_string(),
            pin: Box::new(pin),
            active_low: config.active_low,
            state: Mutex::new(LedState::default()),
        });
        inner.drive(&mut inner.state.lock(), false);

        let handler = Arc::clone(&inner);
        let handle = bus.clone();
        bus.register(
            Module::new(name)
                .with_request_handler(
                    move |action: &str, request: &[u8], response: &mut Response<'_>| -> BusResult<()> {
                        handler.handle(&handle, action, request, response)
                    },
                )
                .with_actions(ACTIONS),
        )?;

        info!(led = name, active_low = config.active_low, "LED registered");
        Ok(Self {
            name: name.to_string(),
            inner,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical state, independent of `active_low`.
    pub fn is_on(&self) -> bool {
        self.inner.state.lock().on
    }

    /// Stop blinking and remove the module from the bus.
    pub fn unregister(self, bus: &Bus) -> BusResult<()> {
        {
            let mut state = self.inner.state.lock();
            self.inner.stop_blink(bus, &mut state);
        }
        bus.unregister(&self.name)?;
        info!(led = %self.name, "LED unregistered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blink_params_full() {
        assert_eq!(
            BlinkParams::parse("100,50,3"),
            BlinkParams {
                on_ms: 100,
                off_ms: 50,
                count: 3
            }
        );
    }

    #[test]
    fn test_blink_params_defaults() {
        assert_eq!(BlinkParams::parse(""), BlinkParams::default());
        assert_eq!(
            BlinkParams::parse("500"),
            BlinkParams {
                on_ms: 500,
                ..BlinkParams::default()
            }
        );
        assert_eq!(BlinkParams::parse("100,100,-1\0").count, -1);
    }

    #[test]
    fn test_blink_params_stop_at_bad_field() {
        let params = BlinkParams::parse("100,fast,3");
        assert_eq!(params.on_ms, 100);
        assert_eq!(params.off_ms, DEFAULT_PHASE_MS);
        assert_eq!(params.count, -1);

        assert_eq!(BlinkParams::parse("abc"), BlinkParams::default());
    }
}
