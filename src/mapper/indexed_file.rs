//! Multi-stream indexed mapper.
//!
//! Binds N parallel typed streams to one shared data arena. A logical record
//! id addresses an N-slot tuple of byte offsets in the index file; each slot
//! points at that record's payload for one stream in the data file, or holds
//! [`INVALID_OFFSET`] when the stream has no payload yet.
//!
//! ## On-Disk Layout
//!
//! For a path prefix `P`:
//!
//! ```text
//! P_index.dat   [Offset; N] per logical record, no padding between slots
//! P_data.dat    variable-length payloads, concatenated in write order
//! ```
//!
//! Slot 0 is written when the record is appended and is always valid; slots
//! 1.. start as the sentinel and are patched in place by the stream updates.
//! The index points into the data file, never the reverse, so truncation
//! cascades index first, then data.
//!
//! ## Stream Lists
//!
//! The stream types are a compile-time tuple: `(TxHead,)` for a single
//! stream, `(TxHead, TxWitness)` for two, and so on up to four. The
//! [`StreamList`] and [`StreamAt`] impls are written once per arity, which
//! keeps slot access fully typed with no per-call descriptor lookups.

use std::mem::align_of;
use std::path::{Path, PathBuf};

use eyre::Result;
use zerocopy::IntoBytes;

use super::{
    typed_at, typed_prefix_mut, ByteFile, ByteFileMut, ByteStore, Offset, Record, RecordFile,
    VarRecord, VarSized, INVALID_OFFSET,
};

/// Per-record slot tuple stored in the index file.
pub type FileIndex<const N: usize> = [Offset; N];

/// Compile-time list of a mapper's stream types. Implemented for tuples of
/// [`Record`] types up to arity 4.
pub trait StreamList {
    const COUNT: usize;

    /// Stream 0's element type; the payload written with every new record.
    type Head: Record;

    /// The index-file record: one offset per stream.
    type Index: Record + Copy + AsRef<[Offset]> + AsMut<[Offset]>;

    /// Tuple of `Option<&T_k>`, one per stream.
    type Refs<'a>
    where
        Self: 'a;

    fn new_entry(first: Offset) -> Self::Index;

    fn resolve<'a, S: ByteStore>(data: &'a S, entry: &Self::Index) -> Result<Self::Refs<'a>>;
}

/// Selects the element type of stream `K` within a [`StreamList`].
pub trait StreamAt<const K: usize>: StreamList {
    type Element: Record;
}

macro_rules! stream_head {
    ($head:ident $(, $rest:ident)*) => { $head };
}

macro_rules! impl_stream_list {
    ($count:literal => $(($ty:ident, $slot:tt)),+) => {
        impl<$($ty: Record),+> StreamList for ($($ty,)+) {
            const COUNT: usize = $count;
            type Head = stream_head!($($ty),+);
            type Index = FileIndex<$count>;
            type Refs<'a>
                = ($(Option<&'a $ty>,)+)
            where
                Self: 'a;

            fn new_entry(first: Offset) -> Self::Index {
                let mut entry = [INVALID_OFFSET; $count];
                entry[0] = first;
                entry
            }

            fn resolve<'a, S: ByteStore>(
                data: &'a S,
                entry: &Self::Index,
            ) -> Result<Self::Refs<'a>> {
                Ok(($(typed_at::<$ty, S>(data, entry[$slot])?,)+))
            }
        }
    };
}

macro_rules! impl_stream_at {
    (($($ty:ident),+) => $slot:tt is $elem:ident) => {
        impl<$($ty: Record),+> StreamAt<$slot> for ($($ty,)+) {
            type Element = $elem;
        }
    };
}

// Arity 1 is special-cased so `records` yields the bare reference instead of
// a one-element tuple.
impl<T0: Record> StreamList for (T0,) {
    const COUNT: usize = 1;
    type Head = T0;
    type Index = FileIndex<1>;
    type Refs<'a>
        = Option<&'a T0>
    where
        Self: 'a;

    fn new_entry(first: Offset) -> Self::Index {
        [first]
    }

    fn resolve<'a, S: ByteStore>(data: &'a S, entry: &Self::Index) -> Result<Self::Refs<'a>> {
        typed_at::<T0, S>(data, entry[0])
    }
}
impl_stream_at!((T0) => 0 is T0);

impl_stream_list!(2 => (T0, 0), (T1, 1));
impl_stream_at!((T0, T1) => 0 is T0);
impl_stream_at!((T0, T1) => 1 is T1);

impl_stream_list!(3 => (T0, 0), (T1, 1), (T2, 2));
impl_stream_at!((T0, T1, T2) => 0 is T0);
impl_stream_at!((T0, T1, T2) => 1 is T1);
impl_stream_at!((T0, T1, T2) => 2 is T2);

impl_stream_list!(4 => (T0, 0), (T1, 1), (T2, 2), (T3, 3));
impl_stream_at!((T0, T1, T2, T3) => 0 is T0);
impl_stream_at!((T0, T1, T2, T3) => 1 is T1);
impl_stream_at!((T0, T1, T2, T3) => 2 is T2);
impl_stream_at!((T0, T1, T2, T3) => 3 is T3);

/// N typed streams over an index/data file pair.
pub struct IndexedFile<S, L: StreamList> {
    index: RecordFile<S, L::Index>,
    data: S,
}

/// Read-only indexed mapper.
pub type IndexedReader<L> = IndexedFile<ByteFile, L>;

/// Writable indexed mapper.
pub type IndexedWriter<L> = IndexedFile<ByteFileMut, L>;

fn suffixed(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

impl<S: ByteStore, L: StreamList> IndexedFile<S, L> {
    /// Opens the `{prefix}_index.dat` / `{prefix}_data.dat` pair.
    pub fn open<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        let prefix = prefix.as_ref();
        let index = RecordFile::open(suffixed(prefix, "_index.dat"))?;
        let data = S::open(&suffixed(prefix, "_data.dat"))?;
        Ok(Self { index, data })
    }

    /// Number of logical records.
    pub fn len(&self) -> Offset {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Copy of record `index`'s offset tuple.
    pub fn offsets(&self, index: u32) -> Result<L::Index> {
        Ok(*self.index.get(index as Offset)?)
    }

    /// Typed borrow of stream `K` of record `index`; `Ok(None)` when the slot
    /// holds the sentinel.
    pub fn stream<const K: usize>(&self, index: u32) -> Result<Option<&<L as StreamAt<K>>::Element>>
    where
        L: StreamAt<K>,
    {
        let entry = self.offsets(index)?;
        let offset = entry.as_ref()[K];
        debug_assert!(
            offset == INVALID_OFFSET || offset < self.data.len(),
            "slot {} of record {} points past the data file",
            K,
            index
        );
        typed_at(&self.data, offset)
    }

    /// All streams of record `index` at once, as a tuple of `Option<&T_k>`.
    pub fn records(&self, index: u32) -> Result<L::Refs<'_>> {
        let entry = self.offsets(index)?;
        L::resolve(&self.data, &entry)
    }

    /// Reconciles both mappings with the on-disk sizes, index first.
    pub fn reload(&mut self) -> Result<()> {
        self.index.reload()?;
        self.data.reload()
    }
}

impl<L: StreamList> IndexedFile<ByteFileMut, L> {
    /// Appends a new logical record with a fixed-size stream-0 payload.
    /// Slots 1.. start as [`INVALID_OFFSET`].
    pub fn append(&mut self, head: &L::Head) -> Result<bool> {
        self.append_bytes(head.as_bytes())
    }

    /// Appends a new logical record with a variable-length stream-0 payload.
    pub fn append_var(&mut self, payload: &mut VarRecord<L::Head>) -> Result<bool>
    where
        L::Head: VarSized,
    {
        let bytes = payload.finalize();
        self.append_bytes(bytes)
    }

    fn append_bytes(&mut self, bytes: &[u8]) -> Result<bool> {
        debug_assert_eq!(
            bytes.len() % align_of::<L::Head>(),
            0,
            "payload size must be padded to the head alignment"
        );
        debug_assert_eq!(
            self.data.write_offset() % align_of::<L::Head>() as Offset,
            0,
            "data cursor must be aligned for the head type"
        );
        let entry = L::new_entry(self.data.write_offset());
        let index_flushed = self.index.append(&entry)?;
        let data_flushed = self.data.write(bytes)?;
        Ok(index_flushed || data_flushed)
    }

    /// Records a fixed-size payload for stream `K` of an existing record.
    ///
    /// `K` must be 1 or greater; stream 0 is written by [`IndexedFile::append`].
    /// The slot must currently hold the sentinel — appending stream payloads
    /// in record order keeps the data file monotone, which `truncate` relies
    /// on.
    pub fn set<const K: usize>(
        &mut self,
        index: u32,
        value: &<L as StreamAt<K>>::Element,
    ) -> Result<bool>
    where
        L: StreamAt<K>,
    {
        self.set_bytes::<K>(index, value.as_bytes())
    }

    /// Variable-length twin of [`IndexedFile::set`].
    pub fn set_var<const K: usize>(
        &mut self,
        index: u32,
        payload: &mut VarRecord<<L as StreamAt<K>>::Element>,
    ) -> Result<bool>
    where
        L: StreamAt<K>,
        <L as StreamAt<K>>::Element: VarSized,
    {
        let bytes = payload.finalize();
        self.set_bytes::<K>(index, bytes)
    }

    fn set_bytes<const K: usize>(&mut self, index: u32, bytes: &[u8]) -> Result<bool>
    where
        L: StreamAt<K>,
    {
        const {
            assert!(
                K > 0,
                "stream 0 is written by append; updates target streams 1.."
            )
        };
        debug_assert_eq!(
            bytes.len() % align_of::<<L as StreamAt<K>>::Element>(),
            0,
            "payload size must be padded to the element alignment"
        );
        debug_assert_eq!(
            self.data.write_offset() % align_of::<<L as StreamAt<K>>::Element>() as Offset,
            0,
            "data cursor must be aligned for the element type"
        );
        let offset = self.data.write_offset();
        self.index.get_mut(index as Offset)?.as_mut()[K] = offset;
        self.data.write(bytes)
    }

    /// Mutable borrow of stream `K` of record `index`.
    pub fn stream_mut<const K: usize>(
        &mut self,
        index: u32,
    ) -> Result<Option<&mut <L as StreamAt<K>>::Element>>
    where
        L: StreamAt<K>,
    {
        let entry = self.offsets(index)?;
        let offset = entry.as_ref()[K];
        if offset == INVALID_OFFSET {
            return Ok(None);
        }
        let bytes = self
            .data
            .bytes_at_mut(offset)
            .ok_or_else(|| eyre::eyre!("slot {} of record {} has no backing bytes", K, index))?;
        Ok(Some(typed_prefix_mut(bytes)?))
    }

    /// Discards records `index` and beyond: the index file is cut to `index`
    /// records, then the data file to that record's stream-0 offset.
    ///
    /// Only well-defined when stream payloads were appended in record order;
    /// out-of-order stream-k payloads living past the cut point are lost.
    pub fn truncate(&mut self, index: u32) -> Result<()> {
        if (index as Offset) < self.len() {
            let entry = self.offsets(index)?;
            self.index.truncate(index as Offset)?;
            self.data.truncate(entry.as_ref()[0])?;
        }
        Ok(())
    }

    /// Pre-extends the index by `index_slots` records and the data file by
    /// `data_bytes` bytes, zero-filled, for bulk-allocation patterns. The
    /// cursors stay put; subsequent writes patch the grown region in place.
    pub fn grow(&mut self, index_slots: Offset, data_bytes: Offset) -> Result<()> {
        let index_len = self.index.len() + index_slots;
        self.index.truncate(index_len)?;
        let data_len = self.data.len() + data_bytes;
        self.data.truncate(data_len)?;
        Ok(())
    }

    /// Positions the index cursor at record `index` and the data cursor at
    /// `data_offset`.
    pub fn seek(&mut self, index: u32, data_offset: Offset) {
        self.index.seek(index as Offset);
        self.data.seek(data_offset);
    }

    pub fn seek_end(&mut self) {
        self.index.seek_end();
        self.data.seek_end();
    }

    pub fn flush(&mut self) -> Result<()> {
        self.index.flush()?;
        self.data.flush()
    }
}
