use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use tinybus_core::pattern::matches;
use tinybus_core::{Bus, BusConfig, BusResult, Module, Response};

/// Benchmark pattern matching over typical and pathological shapes
fn bench_pattern_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_matching");
    let cases = [
        ("literal", "btn1:short_press", "btn1:short_press"),
        ("prefix_star", "btn*:short_press", "btn12:short_press"),
        ("catch_all", "*", "sensor_42:temperature"),
        ("many_stars", "*a*a*a*a*b", "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
    ];

    for (name, pattern, text) in cases.iter() {
        group.bench_with_input(BenchmarkId::new("matches", name), text, |b, text| {
            b.iter(|| matches(black_box(pattern), black_box(text)));
        });
    }

    group.finish();
}

/// Benchmark blocking request round trips through the worker
fn bench_request_round_trip(c: &mut Criterion) {
    let bus = Bus::new(BusConfig::default());
    bus.init().expect("Should init");
    bus.register(Module::new("echo").with_request_handler(
        |_action: &str, request: &[u8], response: &mut Response<'_>| -> BusResult<()> {
            response.write(request);
            Ok(())
        },
    ))
    .expect("Should register");

    let mut group = c.benchmark_group("request_round_trip");
    for size in [0usize, 16, 256].iter() {
        let payload = vec![0xA5u8; *size];
        let mut buf = vec![0u8; *size];
        group.bench_with_input(BenchmarkId::new("echo", size), size, |b, _| {
            b.iter(|| {
                bus.call(
                    black_box("echo.x"),
                    black_box(&payload),
                    &mut buf,
                    Duration::from_secs(1),
                )
                .expect("Should answer")
            });
        });
    }
    group.finish();

    bus.deinit().expect("Should deinit");
}

criterion_group!(benches, bench_pattern_matching, bench_request_round_trip);
criterion_main!(benches);
