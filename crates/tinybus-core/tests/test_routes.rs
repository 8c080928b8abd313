use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tinybus_core::{
    Bus, BusConfig, BusResult, ErrorKind, Event, Module, Response, RoutedRequest,
};

const TIMEOUT: Duration = Duration::from_secs(2);

type CallLog = Arc<Mutex<Vec<(String, Vec<u8>)>>>;

fn started_bus() -> Bus {
    let bus = Bus::new(BusConfig::default());
    bus.init().expect("Should init");
    bus
}

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

fn flush(bus: &Bus) {
    let seen = Arc::new(AtomicBool::new(false));
    let flag = seen.clone();
    let id = bus
        .subscribe("flush:done", move |_: &Event<'_>| flag.store(true, Ordering::SeqCst))
        .expect("Should subscribe");
    bus.emit("flush", "done", &[]).expect("Should emit");
    assert!(wait_until(TIMEOUT, || seen.load(Ordering::SeqCst)));
    bus.unsubscribe(id);
}

/// Register `name` with a handler that records every action and payload.
fn recording_module(bus: &Bus, name: &str) -> CallLog {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    bus.register(Module::new(name).with_request_handler(
        move |action: &str, request: &[u8], _resp: &mut Response<'_>| -> BusResult<()> {
            sink.lock().push((action.to_string(), request.to_vec()));
            Ok(())
        },
    ))
    .expect("Should register");
    log
}

#[test]
fn test_static_route_invokes_handler() {
    let bus = started_bus();
    let calls = recording_module(&bus, "b");

    bus.on("a:e", "b.f", b"payload").expect("Should route");
    bus.emit("a", "e", b"ignored").expect("Should emit");
    flush(&bus);
    assert_eq!(
        *calls.lock(),
        vec![("f".to_string(), b"payload".to_vec())]
    );

    assert_eq!(bus.off("a:e", None).expect("Should remove"), 1);
    bus.emit("a", "e", &[]).expect("Should emit");
    flush(&bus);
    assert_eq!(calls.lock().len(), 1);

    bus.deinit().expect("Should deinit");
}

#[test]
fn test_wildcard_route() {
    let bus = started_bus();
    let calls = recording_module(&bus, "led1");

    bus.on("btn*:short_press", "led1.toggle", &[])
        .expect("Should route");
    bus.emit("btn1", "short_press", &[]).expect("Should emit");
    bus.emit("btn2", "short_press", &[]).expect("Should emit");
    bus.emit("btn1", "long_press", &[]).expect("Should emit");
    flush(&bus);

    assert_eq!(calls.lock().len(), 2);
    bus.deinit().expect("Should deinit");
}

#[test]
fn test_transform_route_uses_event() {
    let bus = started_bus();
    let calls = recording_module(&bus, "led1");

    bus.on_fn("sensor:level", |event: &Event<'_>| {
        let level = event.payload.first().copied().unwrap_or(0);
        if level > 100 {
            Some(RoutedRequest::new("led1.on", vec![level]))
        } else {
            None
        }
    })
    .expect("Should route");

    bus.emit("sensor", "level", &[50]).expect("Should emit");
    bus.emit("sensor", "level", &[200]).expect("Should emit");
    flush(&bus);

    assert_eq!(*calls.lock(), vec![("on".to_string(), vec![200u8])]);
    bus.deinit().expect("Should deinit");
}

#[test]
fn test_route_removal_by_pair() {
    let bus = started_bus();
    let first = recording_module(&bus, "b");
    let second = recording_module(&bus, "c");

    bus.on("a:e", "b.f", &[]).expect("Should route");
    bus.on("a:e", "c.g", &[]).expect("Should route");
    assert_eq!(bus.off("a:e", Some("b.f")).expect("Should remove"), 1);

    bus.emit("a", "e", &[]).expect("Should emit");
    flush(&bus);
    assert!(first.lock().is_empty());
    assert_eq!(second.lock().len(), 1);

    bus.deinit().expect("Should deinit");
}

#[test]
fn test_routed_requests_run_within_dispatch() {
    let bus = started_bus();
    let order = Arc::new(Mutex::new(Vec::new()));

    let log = order.clone();
    bus.register(Module::new("b").with_request_handler(
        move |action: &str, _req: &[u8], _resp: &mut Response<'_>| -> BusResult<()> {
            log.lock().push(format!("b.{}", action));
            Ok(())
        },
    ))
    .expect("Should register");
    let log = order.clone();
    bus.subscribe("c:*", move |event: &Event<'_>| {
        log.lock().push(event.key());
    })
    .expect("Should subscribe");

    bus.on("a:e", "b.f", &[]).expect("Should route");
    bus.emit("a", "e", &[]).expect("Should emit");
    bus.emit("c", "x", &[]).expect("Should emit");
    assert!(wait_until(TIMEOUT, || order.lock().len() == 2));

    assert_eq!(*order.lock(), vec!["b.f".to_string(), "c:x".to_string()]);
    bus.deinit().expect("Should deinit");
}

#[test]
fn test_subscribers_run_before_routes() {
    let bus = started_bus();
    let order = Arc::new(Mutex::new(Vec::new()));

    let log = order.clone();
    bus.register(Module::new("b").with_request_handler(
        move |_action: &str, _req: &[u8], _resp: &mut Response<'_>| -> BusResult<()> {
            log.lock().push("route");
            Ok(())
        },
    ))
    .expect("Should register");
    bus.on("a:e", "b.f", &[]).expect("Should route");
    let log = order.clone();
    bus.subscribe("a:e", move |_: &Event<'_>| log.lock().push("subscriber"))
        .expect("Should subscribe");

    bus.emit("a", "e", &[]).expect("Should emit");
    flush(&bus);

    assert_eq!(*order.lock(), vec!["subscriber", "route"]);
    bus.deinit().expect("Should deinit");
}

#[test]
fn test_failed_routed_request_is_reported() {
    let bus = started_bus();
    bus.set_strict(true);
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    bus.on_error(move |pattern, err| sink.lock().push((pattern.to_string(), err.kind())));

    bus.on("a:e", "ghost.on", &[]).expect("Should route");
    bus.emit("a", "e", &[]).expect("Should emit");
    flush(&bus);

    assert_eq!(
        *reports.lock(),
        vec![("ghost.on".to_string(), ErrorKind::NotFound)]
    );
    bus.deinit().expect("Should deinit");
}
