use anyhow::Context;
use std::thread;
use std::time::Duration;
use tracing::info;

use tinybus::{
    init_logging, Bus, BusConfig, ButtonConfig, ButtonModule, Event, LedConfig, LedModule,
    SimulatedPin, BUILD_DATE, VERSION,
};

/// Hold the (active-low) button down for `hold`, then release it.
fn press(pin: &SimulatedPin, hold: Duration) {
    pin.set(false);
    thread::sleep(hold);
    pin.set(true);
    thread::sleep(Duration::from_millis(400));
}

fn main() -> anyhow::Result<()> {
    init_logging()?;
    info!("tinybus {} (built {})", VERSION, BUILD_DATE);

    // Optional TOML bus config as the first argument
    let config = match std::env::args().nth(1) {
        Some(path) => BusConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => BusConfig::default(),
    };

    let bus = Bus::new(config);
    bus.init()?;

    let button_pin = SimulatedPin::new(true);
    let led_pin = SimulatedPin::new(false);
    let button = ButtonModule::register(&bus, "btn1", button_pin.clone(), ButtonConfig::default())?;
    let led = LedModule::register(&bus, "led1", led_pin.clone(), LedConfig::default())?;

    bus.on("btn1:short_press", "led1.toggle", &[])?;
    bus.on("btn1:long_press", "led1.blink", b"100,100,3")?;
    bus.subscribe("btn*:*", |event: &Event<'_>| {
        info!(event = %event.key(), "Button event");
    })?;

    for module in bus.modules() {
        if let Some(descriptor) = bus.describe(&module) {
            info!("{}", serde_json::to_string(&descriptor)?);
        }
    }

    info!("Short press");
    press(&button_pin, Duration::from_millis(100));
    info!(led = led_pin.level(), "LED after short press");

    info!("Long press");
    press(&button_pin, Duration::from_millis(1_200));
    thread::sleep(Duration::from_millis(800));
    info!(led = led_pin.level(), "LED after blinking");

    let mut state = [0u8; 1];
    bus.call("led1.get_state", &[], &mut state, Duration::from_millis(100))?;
    info!(on = state[0] != 0, "LED state via request");

    button.unregister(&bus)?;
    led.unregister(&bus)?;
    bus.deinit()?;
    info!("Bus stopped");
    Ok(())
}
