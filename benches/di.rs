use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::sync::Arc;
use tessera_di::*;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ===== Micro Benchmarks =====

fn bench_singleton_hit(c: &mut Criterion) {
    let rt = runtime();
    let mut sc = ServiceCollection::new();
    sc.add_singleton(42u64);
    let sp = sc.build();

    // Prime the singleton
    rt.block_on(sp.get::<u64>()).unwrap();

    c.bench_function("singleton_hit_u64", |b| {
        b.iter(|| {
            let v = rt.block_on(sp.get::<u64>()).unwrap();
            black_box(v);
        })
    });
}

fn bench_singleton_cold(c: &mut Criterion) {
    struct ExpensiveToCreate {
        data: Vec<u64>,
    }

    let rt = runtime();
    c.bench_function("singleton_cold_expensive", |b| {
        b.iter_batched(
            || {
                let mut sc = ServiceCollection::new();
                sc.add_singleton_factory::<ExpensiveToCreate, _>(keys![], |_| {
                    Ok(ExpensiveToCreate {
                        data: (0..1000).collect(),
                    })
                });
                sc.build()
            },
            |sp| {
                let v = rt.block_on(sp.get::<ExpensiveToCreate>()).unwrap();
                black_box(v.data.len());
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_scoped_vs_transient(c: &mut Criterion) {
    struct Service {
        value: u64,
    }

    let rt = runtime();
    let mut group = c.benchmark_group("lifetimes");

    let mut scoped = ServiceCollection::new();
    scoped.add_scoped_factory::<Service, _>(keys![], |_| Ok(Service { value: 1 }));
    let scoped = scoped.build();
    let scope = scoped.create_scope();
    rt.block_on(scope.get::<Service>()).unwrap();

    group.bench_function("scoped_hit", |b| {
        b.iter(|| {
            let v = rt.block_on(scope.get::<Service>()).unwrap();
            black_box(v.value);
        })
    });

    let mut transient = ServiceCollection::new();
    transient.add_transient_factory::<Service, _>(keys![], |_| Ok(Service { value: 2 }));
    let transient = transient.build();

    group.bench_function("transient_build", |b| {
        b.iter(|| {
            let v = rt.block_on(transient.get::<Service>()).unwrap();
            black_box(v.value);
        })
    });

    group.finish();
    rt.block_on(scope.close()).unwrap();
}

fn bench_concrete_vs_trait(c: &mut Criterion) {
    trait Greeter: Send + Sync {
        fn greet(&self) -> usize;
    }
    struct English;
    impl Greeter for English {
        fn greet(&self) -> usize {
            5
        }
    }

    let rt = runtime();
    let mut sc = ServiceCollection::new();
    sc.add_singleton(English);
    sc.add_singleton_trait(Arc::new(English) as Arc<dyn Greeter>);
    let sp = sc.build();

    let mut group = c.benchmark_group("concrete_vs_trait");
    group.bench_function("concrete", |b| {
        b.iter(|| {
            let v = rt.block_on(sp.get::<English>()).unwrap();
            black_box(v.greet());
        })
    });
    group.bench_function("trait", |b| {
        b.iter(|| {
            let v = rt.block_on(sp.get_trait::<dyn Greeter>()).unwrap();
            black_box(v.greet());
        })
    });
    group.finish();
}

fn bench_scope_lifecycle(c: &mut Criterion) {
    struct RequestContext(u64);
    struct Handler {
        _context: Arc<RequestContext>,
    }

    let rt = runtime();
    let mut sc = ServiceCollection::new();
    sc.add_scoped_factory::<RequestContext, _>(keys![], |_| Ok(RequestContext(7)));
    sc.add_transient_factory::<Handler, _>(keys![RequestContext], |deps| {
        Ok(Handler {
            _context: deps.get::<RequestContext>()?,
        })
    });
    let sp = sc.build();

    c.bench_function("scope_open_resolve_close", |b| {
        b.iter(|| {
            rt.block_on(async {
                let scope = sp.create_scope();
                let handler = scope.get::<Handler>().await.unwrap();
                black_box(handler);
                scope.close().await.unwrap();
            })
        })
    });
}

fn bench_planning_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning");

    struct Service1;
    struct Service2;
    struct Service3;
    struct Service4;
    struct Service5;
    struct Service6;
    struct Service7;
    struct Service8;

    let mut sc = ServiceCollection::new();
    sc.add_transient_factory::<Service1, _>(keys![], |_| Ok(Service1));
    sc.add_transient_factory::<Service2, _>(keys![Service1], |_| Ok(Service2));
    sc.add_transient_factory::<Service3, _>(keys![Service2], |_| Ok(Service3));
    sc.add_transient_factory::<Service4, _>(keys![Service3], |_| Ok(Service4));
    sc.add_transient_factory::<Service5, _>(keys![Service4], |_| Ok(Service5));
    sc.add_transient_factory::<Service6, _>(keys![Service5], |_| Ok(Service6));
    sc.add_transient_factory::<Service7, _>(keys![Service6], |_| Ok(Service7));
    sc.add_transient_factory::<Service8, _>(keys![Service7], |_| Ok(Service8));
    let sp = sc.build();
    let root = key_of_type::<Service8>();

    group.bench_function("plan_chain_depth_8", |b| {
        b.iter(|| {
            let plan = sp.plan(&root, None).unwrap();
            black_box(plan.len());
        })
    });

    let rt = runtime();
    group.bench_function("resolve_chain_depth_8", |b| {
        b.iter(|| {
            let v = rt.block_on(sp.get::<Service8>()).unwrap();
            black_box(v);
        })
    });

    group.finish();
}

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");

    let mut sc = ServiceCollection::new();
    sc.add_singleton(42u64);
    let sp = sc.build();

    // Prime the singleton
    runtime().block_on(sp.get::<u64>()).unwrap();

    for &thread_count in &[1, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("singleton_threads", thread_count),
            &thread_count,
            |b, &threads| {
                b.iter_custom(|iters| {
                    let start = std::time::Instant::now();
                    crossbeam_utils::thread::scope(|s| {
                        for _ in 0..threads {
                            let sp_ref = &sp;
                            s.spawn(move |_| {
                                let rt = runtime();
                                for _ in 0..iters / threads as u64 {
                                    let v = rt.block_on(sp_ref.get::<u64>()).unwrap();
                                    black_box(v);
                                }
                            });
                        }
                    })
                    .unwrap();
                    start.elapsed()
                })
            },
        );
    }

    group.finish();
}

// ===== Macro Benchmarks =====

fn bench_large_registry(c: &mut Criterion) {
    const NAMES: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

    let rt = runtime();
    let mut group = c.benchmark_group("large_registry");

    for &service_count in &[1usize, 4, 8] {
        let mut sc = ServiceCollection::new();

        // Register a baseline service we'll always resolve
        sc.add_singleton(42u64);
        for &name in NAMES.iter().take(service_count) {
            sc.add_named_singleton(name, 7u32);
        }

        let sp = sc.build();

        group.bench_with_input(
            BenchmarkId::new("resolve_from_large_registry", service_count),
            &service_count,
            |b, _| {
                b.iter(|| {
                    let v = rt.block_on(sp.get::<u64>()).unwrap();
                    black_box(v);
                })
            },
        );
    }

    group.finish();
}

fn bench_mixed_workload(c: &mut Criterion) {
    // 70% singleton hits, 20% scoped hits, 10% transient
    struct SingletonService(u64);
    struct ScopedService(u64);
    struct TransientService(u64);

    let rt = runtime();
    let mut sc = ServiceCollection::new();
    sc.add_singleton(SingletonService(1));
    sc.add_scoped_factory::<ScopedService, _>(keys![], |_| Ok(ScopedService(2)));
    sc.add_transient_factory::<TransientService, _>(keys![], |_| Ok(TransientService(3)));

    let sp = sc.build();
    let scope = sp.create_scope();

    c.bench_function("mixed_workload_realistic", |b| {
        b.iter(|| {
            rt.block_on(async {
                for _ in 0..7 {
                    let v = sp.get::<SingletonService>().await.unwrap();
                    black_box(v.0);
                }
                for _ in 0..2 {
                    let v = scope.get::<ScopedService>().await.unwrap();
                    black_box(v.0);
                }
                let v = sp.get::<TransientService>().await.unwrap();
                black_box(v.0);
            })
        })
    });

    rt.block_on(scope.close()).unwrap();
}

criterion_group!(
    micro_benches,
    bench_singleton_hit,
    bench_singleton_cold,
    bench_scoped_vs_transient,
    bench_concrete_vs_trait,
    bench_scope_lifecycle,
    bench_planning_depth,
    bench_contention
);

criterion_group!(macro_benches, bench_large_registry, bench_mixed_workload);

criterion_main!(micro_benches, macro_benches);
