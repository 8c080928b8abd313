use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tinybus_core::{
    ActionSchema, Bus, BusConfig, BusResult, Event, EventSchema, Module, Response, RoutedRequest,
};

const TIMEOUT: Duration = Duration::from_secs(2);

const LED_ACTIONS: &[ActionSchema] = &[
    ActionSchema::new("on", "none", "none", "Turn LED on"),
    ActionSchema::new("get_state", "none", "uint8", "Get LED state (0/1)"),
];

const LED_EVENTS: &[EventSchema] = &[EventSchema::new("changed", "uint8", "State changed")];

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn test_init_is_idempotent() {
    let bus = Bus::default();
    bus.init().expect("Should init");
    bus.init().expect("Second init should be a no-op");
    assert!(bus.is_init());
    bus.deinit().expect("Should deinit");
    assert!(!bus.is_init());
}

#[test]
fn test_deinit_requires_init() {
    let bus = Bus::default();
    assert!(bus.deinit().unwrap_err().is_invalid_state());

    bus.init().expect("Should init");
    bus.deinit().expect("Should deinit");
    assert!(bus.deinit().unwrap_err().is_invalid_state());
}

#[test]
fn test_operations_fail_after_deinit() {
    let bus = Bus::default();
    bus.init().expect("Should init");
    bus.register(Module::new("led1")).expect("Should register");
    bus.deinit().expect("Should deinit");

    let mut buf = [0u8; 4];
    assert!(bus
        .call("led1.on", &[], &mut buf, TIMEOUT)
        .unwrap_err()
        .is_invalid_state());
    assert!(bus.emit("led1", "changed", &[]).unwrap_err().is_invalid_state());
    assert!(bus
        .subscribe("*", |_: &Event<'_>| {})
        .unwrap_err()
        .is_invalid_state());
    assert!(bus
        .tick(Duration::from_millis(10), || {})
        .unwrap_err()
        .is_invalid_state());
    assert!(bus.unregister("led1").unwrap_err().is_invalid_state());
    assert!(!bus.exists("led1"));
    assert!(!bus.has_action("led1", "on"));
    assert!(bus.modules().is_empty());
}

#[test]
fn test_duplicate_registration() {
    let bus = Bus::default();
    bus.init().expect("Should init");
    bus.register(Module::new("btn1").with_actions(LED_ACTIONS))
        .expect("Should register");

    let err = bus.register(Module::new("btn1")).unwrap_err();
    assert!(err.is_invalid_state());
    assert!(bus.exists("btn1"));
    assert!(bus.has_action("btn1", "on"));

    bus.deinit().expect("Should deinit");
}

#[test]
fn test_unregister_unknown_module() {
    let bus = Bus::default();
    bus.init().expect("Should init");
    assert!(bus.unregister("ghost").unwrap_err().is_not_found());
    bus.deinit().expect("Should deinit");
}

#[test]
fn test_schema_queries() {
    let bus = Bus::default();
    bus.init().expect("Should init");
    bus.register(
        Module::new("led1")
            .with_actions(LED_ACTIONS)
            .with_events(LED_EVENTS),
    )
    .expect("Should register");
    bus.register(Module::new("btn1")).expect("Should register");

    assert!(bus.has_action("led1", "get_state"));
    assert!(!bus.has_action("led1", "blink"));
    assert!(bus.has_event("led1", "changed"));
    assert!(!bus.has_event("btn1", "changed"));
    assert_eq!(bus.modules(), vec!["led1".to_string(), "btn1".to_string()]);

    let descriptor = bus.describe("led1").expect("Should describe");
    assert!(!descriptor.has_request_handler);
    assert_eq!(descriptor.actions.len(), 2);
    let json = serde_json::to_string(&descriptor).expect("Should serialize");
    assert!(json.contains("\"get_state\""));
    assert!(bus.describe("ghost").is_none());

    bus.deinit().expect("Should deinit");
}

#[test]
fn test_deinit_clears_registries() {
    let bus = Bus::default();
    bus.init().expect("Should init");
    bus.register(Module::new("led1")).expect("Should register");
    bus.subscribe("*", |_: &Event<'_>| {}).expect("Should subscribe");
    bus.on("a:e", "led1.on", b"x").expect("Should route");
    bus.tick(Duration::from_secs(60), || {}).expect("Should add");
    bus.deinit().expect("Should deinit");

    assert_eq!(bus.module_count(), 0);
    assert_eq!(bus.subscription_count(), 0);
    assert_eq!(bus.route_count(), 0);
    assert_eq!(bus.timer_count(), 0);

    // A fresh start accepts the same names again
    bus.init().expect("Should init again");
    bus.register(Module::new("led1")).expect("Should register again");
    bus.deinit().expect("Should deinit");
}

#[test]
fn test_register_unregister_cycles_release_everything() {
    let bus = Bus::default();
    bus.init().expect("Should init");
    let token = Arc::new(());

    for _ in 0..50 {
        let held = token.clone();
        bus.register(Module::new("tmp").with_request_handler(
            move |_action: &str, _req: &[u8], _resp: &mut Response<'_>| -> BusResult<()> {
                let _ = &held;
                Ok(())
            },
        ))
        .expect("Should register");
        bus.unregister("tmp").expect("Should unregister");

        let held = token.clone();
        let id = bus
            .subscribe("tmp:*", move |_: &Event<'_>| {
                let _ = &held;
            })
            .expect("Should subscribe");
        assert!(bus.unsubscribe(id));

        let held = token.clone();
        bus.on_fn("tmp:*", move |_: &Event<'_>| -> Option<RoutedRequest> {
            let _ = &held;
            None
        })
        .expect("Should route");
        assert_eq!(bus.off("tmp:*", None).expect("Should remove"), 1);

        let held = token.clone();
        let id = bus
            .tick(Duration::from_secs(60), move || {
                let _ = &held;
            })
            .expect("Should add");
        assert!(bus.cancel(id));
    }

    assert_eq!(Arc::strong_count(&token), 1);
    assert_eq!(bus.module_count(), 0);
    assert_eq!(bus.subscription_count(), 0);
    assert_eq!(bus.route_count(), 0);
    assert_eq!(bus.timer_count(), 0);
    bus.deinit().expect("Should deinit");
}

#[test]
fn test_deinit_from_handler() {
    let bus = Bus::default();
    bus.init().expect("Should init");
    let stopped = Arc::new(AtomicBool::new(false));

    let handle = bus.clone();
    let flag = stopped.clone();
    bus.register(Module::new("ctl").with_request_handler(
        move |_action: &str, _req: &[u8], _resp: &mut Response<'_>| -> BusResult<()> {
            handle.deinit()?;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        },
    ))
    .expect("Should register");

    let mut buf = [0u8; 1];
    assert_eq!(bus.call("ctl.stop", &[], &mut buf, TIMEOUT), Ok(0));
    assert!(wait_until(TIMEOUT, || stopped.load(Ordering::SeqCst)));
    assert!(!bus.is_init());
}

#[test]
fn test_deinit_from_handler_fails_queued_callers() {
    let bus = Bus::default();
    bus.init().expect("Should init");
    let echoed = Arc::new(AtomicUsize::new(0));

    let handle = bus.clone();
    bus.register(Module::new("ctl").with_request_handler(
        move |_action: &str, _req: &[u8], _resp: &mut Response<'_>| -> BusResult<()> {
            thread::sleep(Duration::from_millis(150));
            handle.deinit()
        },
    ))
    .expect("Should register");
    let count = echoed.clone();
    bus.register(Module::new("echo").with_request_handler(
        move |_action: &str, request: &[u8], response: &mut Response<'_>| -> BusResult<()> {
            count.fetch_add(1, Ordering::SeqCst);
            response.write(request);
            Ok(())
        },
    ))
    .expect("Should register");

    bus.send("ctl.stop", &[]).expect("Should queue");
    thread::sleep(Duration::from_millis(30));

    // Queued behind the handler that stops the bus
    let mut buf = [0u8; 4];
    let err = bus.call("echo.x", b"hi", &mut buf, TIMEOUT).unwrap_err();
    assert!(err.is_invalid_state());
    assert_eq!(echoed.load(Ordering::SeqCst), 0);
    assert!(!bus.is_init());
}

#[test]
fn test_reinit_after_deinit_from_handler() {
    let bus = Bus::default();
    bus.init().expect("Should init");
    let handle = bus.clone();
    bus.register(Module::new("ctl").with_request_handler(
        move |_action: &str, _req: &[u8], _resp: &mut Response<'_>| -> BusResult<()> {
            handle.deinit()
        },
    ))
    .expect("Should register");

    let mut buf = [0u8; 1];
    assert_eq!(bus.call("ctl.stop", &[], &mut buf, TIMEOUT), Ok(0));
    assert!(wait_until(TIMEOUT, || !bus.is_init()));

    bus.init().expect("Should init again");
    bus.register(Module::new("echo").with_request_handler(
        |_action: &str, request: &[u8], response: &mut Response<'_>| -> BusResult<()> {
            response.write(request);
            Ok(())
        },
    ))
    .expect("Should register");
    let mut buf = [0u8; 2];
    assert_eq!(bus.call("echo.x", b"ok", &mut buf, TIMEOUT), Ok(2));
    bus.deinit().expect("Should deinit");
}

#[test]
fn test_bus_from_toml_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "queue_capacity = 4\nstrict = true\nworker_name = \"bus-test\"")
        .expect("write");

    let config = BusConfig::load(file.path()).expect("Should load");
    let bus = Bus::new(config);
    bus.init().expect("Should init");
    assert!(bus.is_strict());
    assert_eq!(bus.config().queue_capacity, 4);

    let mut buf = [0u8; 1];
    assert!(bus
        .call("ghost.on", &[], &mut buf, TIMEOUT)
        .unwrap_err()
        .is_not_found());
    bus.deinit().expect("Should deinit");
}
