//! Performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use heaplog::*;

fn churn_workload(rounds: usize) -> Workload {
    let mut steps = Vec::new();
    for round in 0..rounds {
        for slot in 0..8 {
            steps.push(Step::Alloc {
                name: format!("r{round}s{slot}"),
                size: 64 + (slot as u64 * 96),
            });
        }
        for slot in (0..8).step_by(2) {
            steps.push(Step::Free {
                name: format!("r{round}s{slot}"),
            });
        }
    }
    Workload::new(steps).expect("handles are consistent")
}

fn benchmark_simulation(c: &mut Criterion) {
    let workload = churn_workload(64);

    c.bench_function("simulate_churn_64_rounds", |b| {
        b.iter(|| {
            let recorder = EventRecorder::new(Vec::new(), Vec::new()).unwrap();
            let mut sim = Simulator::new(SimulationConfig::default(), recorder).unwrap();
            black_box(sim.run(&workload).unwrap());
            black_box(sim.finish().unwrap());
        });
    });

    c.bench_function("cache_access_sweep", |b| {
        b.iter(|| {
            let mut cache = DirectMappedCache::new(1024, 64).unwrap();
            for address in (0..65_536u64).step_by(48) {
                black_box(cache.access(address));
            }
            black_box(cache.stats())
        });
    });
}

criterion_group!(benches, benchmark_simulation);
criterion_main!(benches);
