//! # Relay Benchmarks
//!
//! | Component | Operation |
//! |-----------|-----------|
//! | LocalFixedWindow | check, spread over many identifiers |
//! | LocalTokenBucket | check, single hot identifier |
//! | LocalBus | publish fan-out to N subscribers |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use relay_bus::{BusBackend, EventEnvelope, LocalBus};
use relay_ratelimit::{BucketParams, LocalFixedWindow, LocalTokenBucket, RateLimiter, WindowParams};
use std::time::Duration;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn bench_fixed_window(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("fixed-window");
    group.measurement_time(Duration::from_secs(5));

    for clients in [1usize, 1_000, 100_000] {
        let limiter = LocalFixedWindow::new("bench", WindowParams::new(u64::MAX, 60).expect("params"));
        let ids: Vec<String> = (0..clients).map(|i| format!("client-{i}")).collect();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("check", clients), &ids, |b, ids| {
            let mut rng = rand::thread_rng();
            b.to_async(&rt).iter(|| {
                let id = &ids[rng.gen_range(0..ids.len())];
                let limiter = &limiter;
                async move { black_box(limiter.check(id, 1).await) }
            })
        });
    }
    group.finish();
}

fn bench_token_bucket(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("token-bucket");

    let limiter = LocalTokenBucket::new(
        "bench",
        BucketParams::new(1_000_000, 1_000_000.0).expect("params"),
    );
    group.bench_function("check_hot_key", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(limiter.check("hot", 1).await) })
    });
    group.finish();
}

fn bench_local_fan_out(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("local-bus");

    for subscribers in [1usize, 100, 1_000] {
        let bus = LocalBus::with_buffer(16);
        let subs: Vec<_> = rt.block_on(async {
            let mut subs = Vec::with_capacity(subscribers);
            for _ in 0..subscribers {
                subs.push(bus.subscribe().await.expect("subscribe"));
            }
            subs
        });

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("publish", subscribers),
            &subscribers,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    black_box(bus.publish(EventEnvelope::new("message").field("n", 1)).await)
                })
            },
        );
        drop(subs);
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_fixed_window,
    bench_token_bucket,
    bench_local_fan_out
);
criterion_main!(benches);
