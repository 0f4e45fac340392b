//! Benchmarks for signal decoding and packing
//!
//! Covers the per-frame work done when rendering a monitor row:
//! - Field extraction at byte-aligned and unaligned offsets
//! - Full-frame text decode through the signal database
//! - Packing values into a payload
//!
//! Run with `cargo bench --features benchmark`.

use canbench::{SignalDatabase, SignalField, codec, decode, pack};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

const BMS_ID: u32 = 0x18F8_1280;

fn bms_frame() -> [u8; 8] {
    let mut data = [0u8; 8];
    pack(&mut data, 0, 16, 78.4, 0.1).expect("voltage fits");
    pack(&mut data, 16, 16, 12.5, 0.05).expect("current fits");
    pack(&mut data, 32, 8, 85.0, 1.0).expect("soc fits");
    pack(&mut data, 40, 8, 95.0, 1.0).expect("soh fits");
    pack(&mut data, 48, 16, 120.0, 1.0).expect("cycles fit");
    data
}

fn bms_database() -> SignalDatabase {
    let mut db = SignalDatabase::new();
    db.insert(BMS_ID, SignalField::new("Voltage", 0, 16, 0.1, "V"));
    db.insert(BMS_ID, SignalField::new("Current", 16, 16, 0.05, "A"));
    db.insert(BMS_ID, SignalField::new("SOC", 32, 8, 1.0, "%"));
    db.insert(BMS_ID, SignalField::new("SOH", 40, 8, 1.0, "%"));
    db.insert(BMS_ID, SignalField::new("FullChargeCycles", 48, 16, 1.0, ""));
    db
}

fn bench_field_extraction(c: &mut Criterion) {
    let data = bms_frame();
    let mut group = c.benchmark_group("field_extraction");

    for (label, bit_start, bit_length) in [("aligned_u16", 0u16, 16u8), ("unaligned_u12", 13, 12), ("wide_u64", 0, 64)]
    {
        let field = SignalField::new(label, bit_start, bit_length, 1.0, "");
        group.bench_with_input(BenchmarkId::from_parameter(label), &field, |b, field| {
            b.iter(|| black_box(codec::raw_value(black_box(&data), field)))
        });
    }

    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let data = bms_frame();
    let db = bms_database();
    let fields = db.fields(BMS_ID).expect("bms fields registered").to_vec();

    let mut group = c.benchmark_group("frame_decode");
    group.bench_function("known_id", |b| b.iter(|| black_box(db.decode(BMS_ID, black_box(&data)))));
    group.bench_function("unknown_id_hex_fallback", |b| {
        b.iter(|| black_box(db.decode(0x123, black_box(&data))))
    });
    group.bench_function("field_slice", |b| b.iter(|| black_box(decode(black_box(&data), &fields))));
    group.finish();
}

fn bench_pack(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack");
    group.bench_function("bms_frame", |b| b.iter(|| black_box(bms_frame())));
    group.bench_function("saturating", |b| {
        b.iter(|| {
            let mut data = [0u8; 8];
            black_box(pack(&mut data, 3, 10, black_box(1.0e9), 0.5))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_field_extraction, bench_frame_decode, bench_pack);
criterion_main!(benches);
