//! Event storage performance benchmarks
//!
//! Benchmarks for the hot paths of the telemetry pipeline:
//! - Size-only encoding of a typical record
//! - Encoding records straight into storage
//! - Draining stored records, batched and unbatched
//!
//! Run with: cargo bench -p beacon-storage

use beacon_storage::{
    compute_size, DataSource, EncodeError, Encoder, EventStorage, EventStorageConfig,
    SerializerHelper,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Heartbeat-like record: a small map of metric keys to values
fn heartbeat(e: &mut Encoder<'_>) -> Result<(), EncodeError> {
    e.encode_dictionary_begin(4)?;
    e.encode_string("uptime_s")?;
    e.encode_unsigned_integer(86_400)?;
    e.encode_string("battery_pct")?;
    e.encode_signed_integer(-3)?;
    e.encode_string("bytes_sent")?;
    e.encode_long_signed_integer(9_876_543_210)?;
    e.encode_string("fw")?;
    e.encode_byte_string(&[0xde, 0xad, 0xbe, 0xef])
}

fn fill(storage: &mut EventStorage, helper: &mut SerializerHelper) -> usize {
    let mut stored = 0;
    while helper.encode_to_storage(storage, heartbeat).is_ok() {
        stored += 1;
    }
    stored
}

// ============================================================================
// Encoding Benchmarks
// ============================================================================

fn bench_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoding");

    group.bench_function("compute_size", |b| {
        b.iter(|| compute_size(black_box(heartbeat)).unwrap())
    });

    let record_size = compute_size(heartbeat).unwrap() as u64;
    group.throughput(Throughput::Bytes(record_size));
    group.bench_function("encode_to_storage", |b| {
        let mut storage = EventStorage::with_capacity(4096, EventStorageConfig::default());
        let mut helper = SerializerHelper::new();
        b.iter(|| {
            if helper.encode_to_storage(&mut storage, heartbeat).is_err() {
                while storage.has_data().is_some() {
                    storage.mark_read();
                }
                helper.encode_to_storage(&mut storage, heartbeat).unwrap();
            }
        })
    });

    group.finish();
}

// ============================================================================
// Drain Benchmarks
// ============================================================================

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain");

    let configs = [
        ("unbatched", EventStorageConfig::default()),
        ("batched_512b", EventStorageConfig::batched(512)),
        ("batched_unlimited", EventStorageConfig::unlimited_batching()),
    ];

    for (name, config) in configs {
        group.bench_with_input(BenchmarkId::new("drain_16kb", name), &config, |b, config| {
            let mut buf = vec![0u8; 16 * 1024];
            let mut helper = SerializerHelper::new();
            b.iter(|| {
                let mut storage = EventStorage::with_capacity(16 * 1024, config.clone());
                fill(&mut storage, &mut helper);

                let mut drain = storage.drain();
                while let Some(size) = drain.has_more() {
                    drain.read(0, &mut buf[..size]).unwrap();
                    drain.mark_read();
                }
                black_box(&buf);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encoding, bench_drain);
criterion_main!(benches);
