use std::time::Duration;

use calibrate::model::RandomSearch;
use calibrate::{Candidate, EvalContext, FingerprintStore, Scheduler, SearchSpace};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

fn make_space(dims: usize) -> SearchSpace {
    (0..dims)
        .fold(SearchSpace::builder(), |b, i| b.param(format!("x{i}"), -5.0, 5.0))
        .build()
        .unwrap()
}

fn sphere(c: &Candidate, _: &EvalContext) -> Result<f64, String> {
    Ok(c.iter().map(|(_, v)| v * v).sum())
}

/// End-to-end throughput with a trivial objective: measures queueing,
/// dedup and coordination overhead rather than evaluation cost.
fn bench_run_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_throughput");
    group.sample_size(10);

    for workers in [1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &workers| {
            b.iter(|| {
                Scheduler::builder(sphere)
                    .model(RandomSearch::with_seed(make_space(10), 42))
                    .workers(workers)
                    .budget(500)
                    .poll_interval(Duration::from_millis(5))
                    .build()
                    .unwrap()
                    .run()
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_fingerprint_dedup(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint_dedup");

    for dims in [2, 28] {
        let mut rng = fastrand::Rng::with_seed(7);
        let candidates: Vec<Candidate> = (0..1_000)
            .map(|_| {
                (0..dims)
                    .map(|i| (format!("x{i}"), rng.f64() * 10.0 - 5.0))
                    .collect::<Candidate>()
                    .rounded(4)
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("dims", dims), &candidates, |b, candidates| {
            b.iter(|| {
                let mut store = FingerprintStore::new();
                for candidate in candidates {
                    store.insert(candidate.fingerprint());
                }
                store.len()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_run_throughput, bench_fingerprint_dedup);
criterion_main!(benches);
