//! Criterion benchmarks for PIN derivation.
//!
//! Run with:
//! ```bash
//! cargo bench --package boks-core --bench pin_bench
//! ```

use boks_core::crypto::pin::{derive_pin_for, derive_pins, PinType};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_single_pin(c: &mut Criterion) {
    let key = [0x42u8; 32];
    c.bench_function("derive_pin_single_use", |b| {
        b.iter(|| derive_pin_for(black_box(&key), PinType::SingleUse, black_box(1234)).unwrap())
    });
}

/// A full single-use table as generated by the device.
fn bench_table(c: &mut Criterion) {
    let key = [0x42u8; 32];
    c.bench_function("derive_pins_3328", |b| {
        b.iter(|| derive_pins(black_box(&key), PinType::SingleUse, 0..3328).unwrap())
    });
}

criterion_group!(benches, bench_single_pin, bench_table);
criterion_main!(benches);
