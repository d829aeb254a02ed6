use criterion::{criterion_group, criterion_main, Criterion};

use stackbed::{FixedStack, Stack};

fn allocation(c: &mut Criterion) {
    c.bench_function("allocate 64 Kb stack", |b| b.iter(|| FixedStack::new(64 * 1024)));
    c.bench_function("allocate default size stack", |b| {
        b.iter(|| FixedStack::new(FixedStack::default_len()))
    });
}

criterion_group!(benches, allocation);
criterion_main!(benches);
