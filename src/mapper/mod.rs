//! # Mapper Module
//!
//! Typed, memory-mapped, append-only file access. This is the foundation the
//! chain indexes are built on: every block, transaction, and script record
//! lives in a densely packed `.dat` file that is mapped into the process and
//! read back as `&T` without deserialization.
//!
//! ## Layering
//!
//! Three mappers, each a thin layer over the previous one:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ IndexedFile<S, L>                           │
//! │   N typed streams per logical record,       │
//! │   offset tuples in P_index.dat, payloads    │
//! │   in P_data.dat                             │
//! ├─────────────────────────────────────────────┤
//! │ RecordFile<S, T>                            │
//! │   the file as an array of T                 │
//! ├─────────────────────────────────────────────┤
//! │ ByteFile / ByteFileMut                      │
//! │   mmap + append tail buffer + write cursor  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! `S` is the underlying byte store: [`ByteFile`] for readers, [`ByteFileMut`]
//! for the single writer. The [`ByteStore`] trait is the seam that lets the
//! upper layers serve both modes from one implementation.
//!
//! ## Safety Model
//!
//! A mapped region becomes invalid when the file is remapped (flush, reload,
//! truncate). All remapping operations take `&mut self`, so the borrow
//! checker proves no record reference outlives the mapping it points into —
//! no guards, epochs, or reference counts at runtime.
//!
//! Byte-to-record reinterpretation happens once, at the type boundary,
//! through zerocopy's checked casts: size and alignment are verified before a
//! `&T` is produced. Record types declare their layout with the zerocopy
//! derives and host-native field order; nothing is byte-swapped on the way in
//! or out.
//!
//! ## Sharing Discipline
//!
//! One writable mapper per path, owned by one thread. Any number of read-only
//! mappers may coexist over the same path, across threads or processes; they
//! observe writer progress only after [`ByteFile::reload`]. There is no
//! locking in this module.

mod byte_file;
mod indexed_file;
mod payload;
mod record_file;
mod tail;

pub use byte_file::{ByteFile, ByteFileMut, DEFAULT_HIGH_WATER};
pub use indexed_file::{
    FileIndex, IndexedFile, IndexedReader, IndexedWriter, StreamAt, StreamList,
};
pub use payload::{VarRecord, VarSized};
pub use record_file::{RecordFile, RecordReader, RecordWriter};

use std::path::Path;

use eyre::Result;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Byte position within a data file.
pub type Offset = i64;

/// Sentinel offset marking an absent stream payload. Readers resolve a slot
/// holding this value to `None`.
pub const INVALID_OFFSET: Offset = Offset::MAX;

/// A fixed-size value that can live in a mapped file.
///
/// Implemented automatically for every type that carries the zerocopy layout
/// traits; derive those on `#[repr(C)]` structs with no padding.
pub trait Record: FromBytes + IntoBytes + Immutable + KnownLayout {}

impl<T: FromBytes + IntoBytes + Immutable + KnownLayout> Record for T {}

/// Read surface shared by [`ByteFile`] and [`ByteFileMut`].
///
/// [`RecordFile`] and [`IndexedFile`] are generic over this trait so one
/// implementation serves both the reader and the writer mode.
pub trait ByteStore: Sized {
    fn open(path: &Path) -> Result<Self>;

    /// Total bytes currently visible (mapped region plus, for the writable
    /// store, the unflushed tail).
    fn len(&self) -> Offset;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow of the bytes from `offset` to the end of the region holding it.
    /// `None` iff `offset` is [`INVALID_OFFSET`].
    fn bytes_at(&self, offset: Offset) -> Option<&[u8]>;

    /// Reconciles the mapping with the on-disk file size.
    fn reload(&mut self) -> Result<()>;
}

/// Resolves `offset` within `store` to a typed record reference.
///
/// Returns `Ok(None)` for the [`INVALID_OFFSET`] sentinel. Fails if the bytes
/// at `offset` are too short or misaligned for `T`.
pub(crate) fn typed_at<'a, T, S>(store: &'a S, offset: Offset) -> Result<Option<&'a T>>
where
    T: Record,
    S: ByteStore,
{
    match store.bytes_at(offset) {
        Some(bytes) => Ok(Some(typed_prefix(bytes)?)),
        None => Ok(None),
    }
}

/// Reinterprets the front of `bytes` as a `T`, verifying size and alignment.
#[inline]
pub(crate) fn typed_prefix<T: Record>(bytes: &[u8]) -> Result<&T> {
    match T::ref_from_prefix(bytes) {
        Ok((record, _)) => Ok(record),
        Err(err) => Err(eyre::eyre!(
            "failed to reinterpret {} bytes as {}: {:?}",
            bytes.len(),
            std::any::type_name::<T>(),
            err
        )),
    }
}

/// Mutable twin of [`typed_prefix`].
#[inline]
pub(crate) fn typed_prefix_mut<T: Record>(bytes: &mut [u8]) -> Result<&mut T> {
    let len = bytes.len();
    match T::mut_from_prefix(bytes) {
        Ok((record, _)) => Ok(record),
        Err(err) => Err(eyre::eyre!(
            "failed to reinterpret {} bytes as mut {}: {:?}",
            len,
            std::any::type_name::<T>(),
            err
        )),
    }
}
