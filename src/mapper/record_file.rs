//! Fixed-size record view over a byte store.
//!
//! Treats the underlying file as an array of `T`: index `i` lives at byte
//! offset `i * size_of::<T>()`, and the byte length is always a multiple of
//! the record size.

use std::marker::PhantomData;
use std::mem::size_of;
use std::path::Path;

use eyre::{ensure, Result};

use super::{typed_prefix, typed_prefix_mut, ByteFile, ByteFileMut, ByteStore, Offset, Record};

/// Strided view of a byte store as an array of `T`.
pub struct RecordFile<S, T> {
    store: S,
    _record: PhantomData<T>,
}

/// Read-only record mapper.
pub type RecordReader<T> = RecordFile<ByteFile, T>;

/// Writable record mapper.
pub type RecordWriter<T> = RecordFile<ByteFileMut, T>;

impl<S: ByteStore, T: Record> RecordFile<S, T> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        const {
            assert!(
                size_of::<T>() != 0,
                "zero-sized record types are not supported"
            )
        };
        let path = path.as_ref();
        let store = S::open(path)?;
        ensure!(
            store.len() % size_of::<T>() as Offset == 0,
            "'{}' length {} is not a multiple of the record size {}",
            path.display(),
            store.len(),
            size_of::<T>()
        );
        Ok(Self {
            store,
            _record: PhantomData,
        })
    }

    fn byte_offset(index: Offset) -> Offset {
        index * size_of::<T>() as Offset
    }

    /// Number of whole records currently visible.
    pub fn len(&self) -> Offset {
        self.store.len() / size_of::<T>() as Offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: Offset) -> Result<&T> {
        ensure!(
            index >= 0 && index < self.len(),
            "record {} out of bounds (len={})",
            index,
            self.len()
        );
        let bytes = self
            .store
            .bytes_at(Self::byte_offset(index))
            .ok_or_else(|| eyre::eyre!("record {} has no backing bytes", index))?;
        typed_prefix(bytes)
    }

    /// Sequential scan; returns the ascending indices of matching records.
    pub fn find_all<F>(&self, mut pred: F) -> Result<Vec<u32>>
    where
        F: FnMut(&T) -> bool,
    {
        let len = self.len();
        let mut matches = Vec::new();
        for index in 0..len {
            if pred(self.get(index)?) {
                matches.push(index as u32);
            }
        }
        Ok(matches)
    }

    /// Borrowing iterator over all records in index order.
    pub fn iter(&self) -> impl Iterator<Item = Result<&T>> + '_ {
        (0..self.len()).map(move |index| self.get(index))
    }

    pub fn reload(&mut self) -> Result<()> {
        self.store.reload()
    }
}

impl<T: Record> RecordFile<ByteFileMut, T> {
    pub fn get_mut(&mut self, index: Offset) -> Result<&mut T> {
        ensure!(
            index >= 0 && index < self.len(),
            "record {} out of bounds (len={})",
            index,
            self.len()
        );
        let bytes = self
            .store
            .bytes_at_mut(Self::byte_offset(index))
            .ok_or_else(|| eyre::eyre!("record {} has no backing bytes", index))?;
        typed_prefix_mut(bytes)
    }

    /// Appends one record at the cursor, which must sit on a record boundary.
    /// Bubbles up the auto-flush flag from the byte layer.
    pub fn append(&mut self, record: &T) -> Result<bool> {
        debug_assert_eq!(
            self.store.write_offset() % size_of::<T>() as Offset,
            0,
            "write cursor is not on a record boundary"
        );
        self.store.write_record(record)
    }

    pub fn seek(&mut self, index: Offset) {
        self.store.seek(Self::byte_offset(index));
    }

    pub fn seek_end(&mut self) {
        self.store.seek_end();
    }

    /// Resizes to exactly `index` records.
    pub fn truncate(&mut self, index: Offset) -> Result<()> {
        self.store.truncate(Self::byte_offset(index))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
    struct Sample {
        key: u64,
        weight: u32,
        flags: u32,
    }

    fn sample(key: u64) -> Sample {
        Sample {
            key,
            weight: (key % 97) as u32,
            flags: 0,
        }
    }

    #[test]
    fn append_then_get() {
        let dir = tempdir().unwrap();
        let mut records: RecordWriter<Sample> = RecordFile::open(dir.path().join("s.dat")).unwrap();

        for key in 0..10 {
            records.append(&sample(key)).unwrap();
        }

        assert_eq!(records.len(), 10);
        assert_eq!(*records.get(7).unwrap(), sample(7));
    }

    #[test]
    fn get_rejects_out_of_bounds() {
        let dir = tempdir().unwrap();
        let mut records: RecordWriter<u64> = RecordFile::open(dir.path().join("s.dat")).unwrap();
        records.append(&1u64).unwrap();

        assert!(records.get(1).is_err());
        assert!(records.get(-1).is_err());
    }

    #[test]
    fn byte_length_stays_a_record_multiple() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.dat");
        let mut records: RecordWriter<Sample> = RecordFile::open(&path).unwrap();

        for key in 0..25 {
            records.append(&sample(key)).unwrap();
        }
        records.truncate(11).unwrap();
        records.seek_end();
        records.append(&sample(99)).unwrap();
        records.flush().unwrap();

        let bytes = std::fs::metadata(&path).unwrap().len();
        assert_eq!(bytes % size_of::<Sample>() as u64, 0);
        assert_eq!(records.len(), 12);
    }

    #[test]
    fn open_rejects_misaligned_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.dat");
        std::fs::write(&path, [0u8; 17]).unwrap();

        let opened: Result<RecordReader<u64>> = RecordFile::open(&path);
        assert!(opened.is_err());
    }

    #[test]
    fn get_mut_patches_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.dat");
        let mut records: RecordWriter<Sample> = RecordFile::open(&path).unwrap();

        for key in 0..4 {
            records.append(&sample(key)).unwrap();
        }
        records.get_mut(2).unwrap().weight = 777;
        records.flush().unwrap();
        drop(records);

        let reader: RecordReader<Sample> = RecordFile::open(&path).unwrap();
        assert_eq!(reader.get(2).unwrap().weight, 777);
        assert_eq!(reader.get(3).unwrap(), &sample(3));
    }

    #[test]
    fn truncate_keeps_prefix_readable() {
        let dir = tempdir().unwrap();
        let mut records: RecordWriter<u64> = RecordFile::open(dir.path().join("s.dat")).unwrap();

        for v in 0..100u64 {
            records.append(&v).unwrap();
        }
        records.truncate(30).unwrap();

        assert_eq!(records.len(), 30);
        assert_eq!(*records.get(29).unwrap(), 29);
    }

    #[test]
    fn find_all_returns_ascending_matches() {
        let dir = tempdir().unwrap();
        let mut records: RecordWriter<u64> = RecordFile::open(dir.path().join("s.dat")).unwrap();

        for v in 0..50u64 {
            records.append(&v).unwrap();
        }

        let hits = records.find_all(|v| v % 10 == 3).unwrap();
        assert_eq!(hits, vec![3, 13, 23, 33, 43]);
    }

    #[test]
    fn iter_walks_every_record() {
        let dir = tempdir().unwrap();
        let mut records: RecordWriter<u64> = RecordFile::open(dir.path().join("s.dat")).unwrap();

        for v in 0..8u64 {
            records.append(&(v * v)).unwrap();
        }

        let values: Vec<u64> = records.iter().map(|r| *r.unwrap()).collect();
        assert_eq!(values, vec![0, 1, 4, 9, 16, 25, 36, 49]);
    }
}
