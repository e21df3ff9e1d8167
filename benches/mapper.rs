//! Mapper benchmarks for chainfile
//!
//! These measure the hot paths of the storage core: buffered appends into
//! the writable byte mapper, strided typed reads, and indexed stream access.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::tempdir;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use chainfile::{IndexedFile, IndexedWriter, RecordFile, RecordWriter};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct TxHead {
    fee: u64,
    input_count: u32,
    output_count: u32,
}

fn bench_record_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_append");
    group.throughput(Throughput::Bytes(8));

    let dir = tempdir().unwrap();
    let mut writer: RecordWriter<u64> = RecordFile::open(dir.path().join("bench.dat")).unwrap();

    let mut next = 0u64;
    group.bench_function("u64", |b| {
        b.iter(|| {
            next = next.wrapping_add(0x9E37_79B9_7F4A_7C15);
            writer.append(black_box(&next)).unwrap()
        });
    });

    group.finish();
}

fn bench_record_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_scan");

    let dir = tempdir().unwrap();
    let mut writer: RecordWriter<u64> = RecordFile::open(dir.path().join("scan.dat")).unwrap();
    for v in 0..100_000u64 {
        writer.append(&(v * v)).unwrap();
    }
    writer.flush().unwrap();

    group.throughput(Throughput::Elements(100_000));
    group.bench_function("sequential_get", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for i in 0..writer.len() {
                sum = sum.wrapping_add(*writer.get(i).unwrap());
            }
            black_box(sum)
        });
    });

    group.bench_function("find_all_sparse", |b| {
        b.iter(|| black_box(writer.find_all(|v| v % 10_000 == 1).unwrap()));
    });

    group.finish();
}

fn bench_indexed_streams(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexed_streams");

    let dir = tempdir().unwrap();
    let mut txes: IndexedWriter<(TxHead, u64)> = IndexedFile::open(dir.path().join("tx")).unwrap();
    for fee in 0..10_000u64 {
        txes.append(&TxHead {
            fee,
            input_count: 2,
            output_count: 2,
        })
        .unwrap();
        txes.set::<1>(fee as u32, &(fee * 3)).unwrap();
    }
    txes.flush().unwrap();

    group.throughput(Throughput::Elements(10_000));
    group.bench_function("stream_read", |b| {
        b.iter(|| {
            let mut total = 0u64;
            for num in 0..10_000u32 {
                total = total.wrapping_add(txes.stream::<0>(num).unwrap().unwrap().fee);
                total = total.wrapping_add(*txes.stream::<1>(num).unwrap().unwrap());
            }
            black_box(total)
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_record_append,
    bench_record_scan,
    bench_indexed_streams
);
criterion_main!(benches);
