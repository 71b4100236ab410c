//! Registry hot-path benchmarks

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;

use hvlp::registry::{ClientId, Registry};

fn populated(topics: usize, clients: usize) -> Registry {
    let registry = Registry::new();
    for c in 0..clients {
        let client = ClientId::from(format!("c{}", c));
        let names: Vec<String> = (0..topics)
            .step_by(c % 7 + 1)
            .map(|t| format!("t{}", t))
            .collect();
        registry.subscribe(&names, &client);
    }
    registry
}

fn bench_subscribe_cycle(c: &mut Criterion) {
    let registry = Registry::new();
    let client = ClientId::from("bench");

    c.bench_function("subscribe_unsubscribe_single", |b| {
        b.iter(|| {
            registry.subscribe(black_box(["topic"]), &client);
            registry.unsubscribe(black_box(["topic"]), &client);
        })
    });

    let batch: Vec<String> = (0..32).map(|i| format!("batch/{}", i)).collect();
    c.bench_function("subscribe_unsubscribe_batch_32", |b| {
        b.iter(|| {
            registry.subscribe(&batch, &client);
            registry.unsubscribe(&batch, &client);
        })
    });
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");
    for topics in [100usize, 1_000, 10_000] {
        let registry = populated(topics, 50);
        let client = ClientId::from("c3");

        group.bench_with_input(BenchmarkId::new("get_subscribers", topics), &topics, |b, &n| {
            let mut rng = rand::thread_rng();
            b.iter(|| {
                let topic = format!("t{}", rng.gen_range(0..n));
                black_box(registry.get_subscribers(&topic))
            })
        });

        group.bench_with_input(BenchmarkId::new("get_topics", topics), &topics, |b, _| {
            b.iter(|| black_box(registry.get_topics(&client)))
        });
    }
    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    c.bench_function("contended_subscribe_4_threads", |b| {
        b.iter(|| {
            let registry = Arc::new(Registry::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let registry = registry.clone();
                    thread::spawn(move || {
                        let client = ClientId::from(format!("w{}", t));
                        for i in 0..250 {
                            let topic = format!("t{}", i % 16);
                            registry.subscribe([&topic], &client);
                            registry.unsubscribe([&topic], &client);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        })
    });
}

criterion_group!(benches, bench_subscribe_cycle, bench_queries, bench_contended);
criterion_main!(benches);
