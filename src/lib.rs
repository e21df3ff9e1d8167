//! # chainfile - Typed Memory-Mapped Chain Storage
//!
//! chainfile is the storage core of a blockchain analytics stack: densely
//! packed, trivially-copyable records in append-only files, memory-mapped and
//! read back as typed references with zero deserialization. Block, transaction,
//! and script indexes are all built from the three mappers in this crate.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   Chain indexes (blocks, txes, ...)     │   downstream crates
//! ├─────────────────────────────────────────┤
//! │   IndexedFile   N streams per record    │
//! ├─────────────────────────────────────────┤
//! │   RecordFile    file as an array of T   │
//! ├─────────────────────────────────────────┤
//! │   ByteFile(Mut) mmap + tail + cursor    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use chainfile::{IndexedWriter, IndexedReader, IndexedFile};
//!
//! // One writer appends tx heads and later patches in witness payloads.
//! let mut txes: IndexedWriter<(TxHead, TxWitness)> = IndexedFile::open("chain/tx")?;
//! txes.append(&tx_head)?;
//! txes.set::<1>(tx_num, &witness)?;
//! txes.flush()?;
//!
//! // Readers on the same path see flushed progress after a reload.
//! let mut view: IndexedReader<(TxHead, TxWitness)> = IndexedFile::open("chain/tx")?;
//! view.reload()?;
//! let head = view.stream::<0>(tx_num)?;
//! ```
//!
//! ## On-Disk Model
//!
//! Files are raw record bytes in host-native layout: no headers, no
//! checksums, no endian conversion. A `RecordFile<T>` is exactly
//! `len * size_of::<T>()` bytes; an `IndexedFile` pairs `P_index.dat`
//! (per-record offset tuples) with `P_data.dat` (concatenated payloads).
//! Absent stream payloads are marked with the `INVALID_OFFSET` sentinel.
//!
//! ## Concurrency Model
//!
//! Single writer, many readers, no locks. The writer buffers appends in
//! memory and flushes past a high-water mark; readers observe flushed
//! progress when they choose to `reload`. Everything that can invalidate a
//! mapping takes `&mut self`, so the borrow checker rules out dangling record
//! references at compile time.
//!
//! Durability is bounded: a crash loses the unflushed tail, and a torn flush
//! is recovered by the consumer truncating back to its last checkpoint.

pub mod mapper;

pub use mapper::{
    ByteFile, ByteFileMut, ByteStore, FileIndex, IndexedFile, IndexedReader, IndexedWriter,
    Offset, Record, RecordFile, RecordReader, RecordWriter, StreamAt, StreamList, VarRecord,
    VarSized, DEFAULT_HIGH_WATER, INVALID_OFFSET,
};
