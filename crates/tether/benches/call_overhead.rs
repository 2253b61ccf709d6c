use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tether::{Engine, Func, FuncType, Memory, MemoryType, Store, Val, ValType};

fn bench_calls(c: &mut Criterion) {
    let store = Store::new(&Engine::default());
    let mut group = c.benchmark_group("call");

    let noop = Func::wrap(&store, || {});
    group.bench_function("typed_noop", |b| {
        let typed = noop.typed::<(), ()>().unwrap();
        b.iter(|| typed.call(()).unwrap());
    });

    let add = Func::wrap(&store, |a: i32, b: i32| a.wrapping_add(b));
    group.bench_function("typed_add", |b| {
        let typed = add.typed::<(i32, i32), i32>().unwrap();
        b.iter(|| typed.call((black_box(1), black_box(2))).unwrap());
    });

    let ty = FuncType::new([ValType::I64; 4], [ValType::I64]);
    let sum = Func::new(&store, ty, |_, args| {
        Ok(vec![Val::I64(args.iter().map(Val::unwrap_i64).sum())])
    });
    let args = [Val::I64(1), Val::I64(2), Val::I64(3), Val::I64(4)];
    group.bench_function("generic_sum4", |b| {
        b.iter(|| sum.call(black_box(&args)).unwrap());
    });

    group.finish();
}

fn bench_reclaim(c: &mut Criterion) {
    let store = Store::new(&Engine::default());
    let mut group = c.benchmark_group("reclaim");

    for count in [1usize, 16, 256] {
        group.bench_with_input(BenchmarkId::new("memory_drop_flush", count), &count, |b, &count| {
            b.iter(|| {
                for _ in 0..count {
                    drop(Memory::new(&store, MemoryType::new(0, None)).unwrap());
                }
                store.flush()
            });
        });
    }

    group.bench_function("func_register_drop_flush", |b| {
        b.iter(|| {
            drop(Func::wrap(&store, |x: i32| x));
            store.flush()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_calls, bench_reclaim);
criterion_main!(benches);
