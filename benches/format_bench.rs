// Formatting performance benchmarks for iocbridge

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use iocbridge::format::{format_significant, ValueFormatter, DOUBLE_DIGITS, FLOAT_DIGITS};
use iocbridge::host::{DatabaseHost, MemoryHost, RecordTypeBuilder};
use iocbridge::wire::{DbrValue, WireType};
use iocbridge::{Bridge, BridgeOptions, FieldType};
use rand::Rng;
use std::hint::black_box;
use std::sync::Arc;

fn benchmark_format_significant(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_significant");
    let mut rng = rand::rng();
    let values: Vec<f64> = (0..1000).map(|_| rng.random_range(-1e12..1e12)).collect();

    for digits in [FLOAT_DIGITS, DOUBLE_DIGITS] {
        group.throughput(Throughput::Elements(values.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(digits), &digits, |b, &digits| {
            b.iter(|| {
                for v in &values {
                    black_box(format_significant(*v, digits));
                }
            });
        });
    }

    group.finish();
}

fn benchmark_format_field(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_field");

    for size in [1u32, 16, 256] {
        let host = Arc::new(
            MemoryHost::builder()
                .record_type(RecordTypeBuilder::new("array").array("VAL", FieldType::Double, size))
                .record("arr", "array")
                .build()
                .unwrap(),
        );
        let bridge = Bridge::new(host.clone(), BridgeOptions::new().writer("bench", "localhost")).unwrap();
        let values: Vec<DbrValue> = (0..size).map(|i| DbrValue::Float(f64::from(i) / 3.0)).collect();
        bridge.put_values("arr.VAL", &values, Some(WireType::Double)).unwrap();
        let addr = host.name_to_addr("arr.VAL").unwrap();
        let formatter = ValueFormatter::new(host.as_ref());

        group.throughput(Throughput::Elements(u64::from(size)));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(formatter.format(&addr).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_format_significant, benchmark_format_field);
criterion_main!(benches);
