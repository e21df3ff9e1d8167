//! # Reload Consistency Tests
//!
//! A writer and independent read-only mappers over the same path:
//!
//! - R1: readers observe a stable snapshot until they reload
//! - R2: after the writer flushes and the reader reloads, lengths agree
//! - R3: auto-flush makes progress visible to readers without an explicit
//!   flush call from the writer
//!
//! References into the old mapping cannot survive a reload: `reload` takes
//! `&mut self`, so the borrow checker rejects such code outright.

use tempfile::tempdir;

use chainfile::{ByteFileMut, RecordFile, RecordReader, RecordWriter};

#[test]
fn reader_sees_writer_progress_only_after_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("heights.dat");

    let mut reader: RecordReader<u64> = RecordFile::open(&path).unwrap();
    assert_eq!(reader.len(), 0);

    let mut writer: RecordWriter<u64> = RecordFile::open(&path).unwrap();
    for v in 0..10u64 {
        writer.append(&v).unwrap();
    }
    writer.flush().unwrap();

    assert_eq!(reader.len(), 0, "snapshot is stable until reload");

    reader.reload().unwrap();
    assert_eq!(reader.len(), 10);
    for v in 0..10u64 {
        assert_eq!(*reader.get(v as i64).unwrap(), v);
    }
}

#[test]
fn repeated_flush_reload_cycles_stay_in_sync() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("heights.dat");

    let mut writer: RecordWriter<u64> = RecordFile::open(&path).unwrap();
    let mut reader: RecordReader<u64> = RecordFile::open(&path).unwrap();

    let mut expected = 0i64;
    for round in 0..5u64 {
        for v in 0..100u64 {
            writer.append(&(round * 1000 + v)).unwrap();
        }
        writer.flush().unwrap();
        expected += 100;

        reader.reload().unwrap();
        assert_eq!(reader.len(), expected);
        assert_eq!(*reader.get(expected - 1).unwrap(), round * 1000 + 99);
    }
}

#[test]
fn auto_flush_progress_is_visible_to_readers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stream.dat");

    let mut writer = ByteFileMut::with_high_water(&path, 1024).unwrap();
    let mut reader = chainfile::ByteFile::open(&path).unwrap();

    let chunk = [0x5Au8; 16];
    let mut flushed = false;
    for _ in 0..200 {
        flushed |= writer.write(&chunk).unwrap();
    }
    assert!(flushed, "3200 bytes must cross a 1024-byte mark");

    reader.reload().unwrap();
    assert!(reader.len() >= 1024, "auto-flushed prefix is on disk");
    assert!(reader.bytes_at(0).unwrap().iter().all(|&b| b == 0x5A));

    // The writer still sees the full logical length, flushed or not.
    assert_eq!(writer.len(), 3200);
}

#[test]
fn stale_reader_reads_old_records_consistently() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("heights.dat");

    let mut writer: RecordWriter<u64> = RecordFile::open(&path).unwrap();
    for v in 0..50u64 {
        writer.append(&(v * 7)).unwrap();
    }
    writer.flush().unwrap();

    let reader: RecordReader<u64> = RecordFile::open(&path).unwrap();

    for v in 50..80u64 {
        writer.append(&(v * 7)).unwrap();
    }
    writer.flush().unwrap();

    // The un-reloaded snapshot still serves the first 50 records.
    assert_eq!(reader.len(), 50);
    assert_eq!(*reader.get(49).unwrap(), 49 * 7);
}
