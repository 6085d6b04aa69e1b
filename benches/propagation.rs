use criterion::{black_box, criterion_group, criterion_main, Criterion};

use dynprop::{
    AtomicProperty, DefaultValue, DynamicProperty, DynamicPropertyExt, InMemorySource,
    SourcedProperty,
};

fn bench_atomic_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("atomic_set");

    group.bench_function("no_subscribers", |b| {
        let property = AtomicProperty::new(0u64);
        let mut value = 0u64;
        b.iter(|| {
            value = value.wrapping_add(1);
            property.set(black_box(value));
        });
    });

    group.bench_function("eight_subscribers", |b| {
        let property = AtomicProperty::new(0u64);
        let subscriptions: Vec<_> = (0..8)
            .map(|_| property.subscribe_and_call(|_, new| {
                black_box(*new);
            }))
            .collect();
        let mut value = 0u64;
        b.iter(|| {
            value = value.wrapping_add(1);
            property.set(black_box(value));
        });
        drop(subscriptions);
    });

    group.finish();
}

fn bench_mapped_chain(c: &mut Criterion) {
    c.bench_function("mapped_chain_depth_4", |b| {
        let root = AtomicProperty::new(0u64);
        let level1 = root.map(|v| v + 1);
        let level2 = level1.map(|v| v * 2);
        let level3 = level2.map(|v| v + 3);
        let leaf = level3.map(|v| v * 4);

        let mut value = 0u64;
        b.iter(|| {
            value = value.wrapping_add(1);
            root.set(black_box(value));
            black_box(leaf.get());
        });
    });
}

fn bench_source_notify(c: &mut Criterion) {
    c.bench_function("in_memory_set_with_sourced_property", |b| {
        let source = InMemorySource::default();
        source.set("counter", "0").unwrap();
        let property =
            SourcedProperty::<u64>::new(&source, "counter", DefaultValue::none()).unwrap();

        let mut value = 0u64;
        b.iter(|| {
            value = value.wrapping_add(1);
            source.set("counter", value.to_string()).unwrap();
            black_box(property.get());
        });
    });
}

criterion_group!(
    benches,
    bench_atomic_set,
    bench_mapped_chain,
    bench_source_notify
);
criterion_main!(benches);
