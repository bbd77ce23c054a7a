//! Flush throughput benchmarks.

use std::cell::Cell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tracker_core::reactive::{autorun, flush, Computation, Dependency};

fn fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for subscribers in [1usize, 16, 256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                let dep = Dependency::new();
                let runs = Rc::new(Cell::new(0u64));
                let computations: Vec<Computation> = (0..subscribers)
                    .map(|_| {
                        let dep = dep.clone();
                        let runs = runs.clone();
                        autorun(move |_| {
                            dep.depend();
                            runs.set(runs.get() + 1);
                            Ok(())
                        })
                        .unwrap()
                    })
                    .collect();

                b.iter(|| {
                    dep.changed();
                    flush().unwrap();
                    black_box(runs.get());
                });

                for computation in computations {
                    computation.stop();
                }
            },
        );
    }

    group.finish();
}

fn self_invalidation(c: &mut Criterion) {
    c.bench_function("self_invalidation_1000", |b| {
        b.iter(|| {
            let n = Rc::new(Cell::new(0u32));
            let counter = n.clone();
            let computation = autorun(move |c| {
                counter.set(counter.get() + 1);
                if counter.get() < 1000 {
                    c.invalidate();
                }
                Ok(())
            })
            .unwrap();
            flush().unwrap();
            computation.stop();
            black_box(n.get())
        });
    });
}

criterion_group!(benches, fan_out, self_invalidation);
criterion_main!(benches);
