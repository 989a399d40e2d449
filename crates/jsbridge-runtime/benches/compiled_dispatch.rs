//! Compiled script dispatch benchmarks
//!
//! Compares one-shot execution against reusing a compiled script in its own
//! context and in a sibling context, plus the cost of value conversion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jsbridge_runtime::{ContextOptions, Runtime, Value};

const QUOTA: usize = 64 * 1024 * 1024;
const SOURCE: &str = "var total = 0; for (var i = 0; i < 100; i++) total += a * i; total;";

fn bench_execute_vs_compiled(c: &mut Criterion) {
    let runtime = Runtime::new(QUOTA).unwrap();
    let own = runtime
        .new_context_with(ContextOptions::new().global("a", 3))
        .unwrap();
    let sibling = runtime
        .new_context_with(ContextOptions::new().global("a", 5))
        .unwrap();
    let script = own.compile(SOURCE).unwrap();

    let mut group = c.benchmark_group("dispatch");
    group.bench_function("execute_source", |b| {
        b.iter(|| own.execute(black_box(SOURCE)).unwrap())
    });
    group.bench_function("compiled_own_context", |b| {
        b.iter(|| script.execute().unwrap())
    });
    group.bench_function("compiled_sibling_context", |b| {
        b.iter(|| script.execute_in(black_box(&sibling)).unwrap())
    });
    group.finish();
}

fn bench_conversion(c: &mut Criterion) {
    let runtime = Runtime::new(QUOTA).unwrap();
    let ctx = runtime.new_context().unwrap();
    ctx.execute("function id(x) { return x; }").unwrap();

    let mut group = c.benchmark_group("conversion");
    for size in [10usize, 100, 1000] {
        let value = Value::array(
            (0..size)
                .map(|i| Value::object([("i", Value::Int(i as i64)), ("s", Value::string("x"))]))
                .collect(),
        );
        group.bench_with_input(BenchmarkId::new("array_of_objects", size), &value, |b, v| {
            b.iter(|| ctx.call("id", std::slice::from_ref(v)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_execute_vs_compiled, bench_conversion);
criterion_main!(benches);
