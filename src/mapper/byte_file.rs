//! # Byte-Stream Mappers
//!
//! `ByteFile` maps one on-disk file as a read-only byte region. `ByteFileMut`
//! adds the single-writer surface: a logical write cursor and an in-memory
//! tail buffer holding bytes appended past the mapped end, flushed to disk in
//! bulk instead of remapping on every write.
//!
//! ## Logical Layout (writable mode)
//!
//! ```text
//!        0                mapped_len              mapped_len + tail.len()
//!        │                    │                             │
//!        ▼                    ▼                             ▼
//!        ┌────────────────────┬─────────────────────────────┐
//!        │   mmap (on disk)   │   tail buffer (in memory)   │
//!        └────────────────────┴─────────────────────────────┘
//!                              ▲
//!                              write cursor may sit anywhere in [0, len]
//! ```
//!
//! A write at the cursor patches the mapped prefix in place, patches the tail
//! in place, or extends the tail, splitting across regions when it spans the
//! boundary. When the tail grows past the high-water mark it is appended to
//! the file and the file is remapped; `mapped_len` therefore always lands on
//! a whole-write boundary, so no record ever straddles the two regions.
//!
//! ## Crash Behavior
//!
//! There is no write-ahead logging here. A crash between flushes loses the
//! tail; a crash during a flush can leave a torn suffix. Consumers recover by
//! truncating back to their last checkpoint on restart.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use memmap2::{Mmap, MmapMut};

use super::tail::TailBuffer;
use super::{ByteStore, Offset, Record, INVALID_OFFSET};
use zerocopy::IntoBytes;

/// Tail-buffer size above which `write` flushes automatically.
pub const DEFAULT_HIGH_WATER: usize = 50_000_000;

/// Read-only byte mapper. A missing or empty backing file is an empty region,
/// not an error; `reload` picks the file up once a writer creates it.
#[derive(Debug)]
pub struct ByteFile {
    path: PathBuf,
    map: Option<Mmap>,
}

impl ByteFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let map = map_readonly(&path)?;
        Ok(Self { path, map })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> Offset {
        self.map.as_ref().map_or(0, |m| m.len() as Offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-only borrow of the bytes from `offset` to the end of the mapping.
    /// `None` iff `offset` is [`INVALID_OFFSET`]; an out-of-range offset
    /// panics on the slice rather than reading as absent.
    pub fn bytes_at(&self, offset: Offset) -> Option<&[u8]> {
        if offset == INVALID_OFFSET {
            return None;
        }
        debug_assert!(
            offset >= 0 && offset < self.len(),
            "offset {} out of bounds (len={})",
            offset,
            self.len()
        );
        Some(&self.map.as_deref()?[offset as usize..])
    }

    /// Remaps if the on-disk size changed; drops the mapping if the file is
    /// gone. Record references obtained before a reload do not survive it
    /// (`&mut self` enforces this).
    pub fn reload(&mut self) -> Result<()> {
        match fs::metadata(&self.path) {
            Ok(meta) => {
                let mapped = self.map.as_ref().map_or(0, |m| m.len() as u64);
                if meta.len() != mapped {
                    self.map = map_readonly(&self.path)?;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.map = None;
            }
            Err(err) => {
                return Err(err)
                    .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()));
            }
        }
        Ok(())
    }

    /// Advises the kernel to fault in `len` bytes starting at `offset`.
    /// Clamped to the mapping; a pure hint, never an error.
    #[cfg(unix)]
    pub fn prefetch(&self, offset: Offset, len: usize) {
        let Some(map) = self.map.as_ref() else {
            return;
        };
        if offset < 0 || offset as usize >= map.len() {
            return;
        }
        let start = offset as usize;
        let len = len.min(map.len() - start);
        // SAFETY: madvise with MADV_WILLNEED is advisory only. `start` is
        // bounds-checked above and `len` is clamped, so the range lies inside
        // the live mapping.
        unsafe {
            libc::madvise(
                map.as_ptr().add(start) as *mut libc::c_void,
                len,
                libc::MADV_WILLNEED,
            );
        }
    }

    #[cfg(not(unix))]
    pub fn prefetch(&self, _offset: Offset, _len: usize) {}
}

impl ByteStore for ByteFile {
    fn open(path: &Path) -> Result<Self> {
        ByteFile::open(path)
    }

    fn len(&self) -> Offset {
        ByteFile::len(self)
    }

    fn bytes_at(&self, offset: Offset) -> Option<&[u8]> {
        ByteFile::bytes_at(self, offset)
    }

    fn reload(&mut self) -> Result<()> {
        ByteFile::reload(self)
    }
}

/// Writable byte mapper: mapped prefix plus in-memory tail, one writer.
#[derive(Debug)]
pub struct ByteFileMut {
    path: PathBuf,
    file: File,
    map: Option<MmapMut>,
    tail: TailBuffer,
    write_pos: Offset,
    high_water: usize,
}

impl ByteFileMut {
    /// Opens `path` for writing, creating it if absent. The cursor starts at
    /// the end of the existing content.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_high_water(path, DEFAULT_HIGH_WATER)
    }

    /// Like [`ByteFileMut::open`] with a custom auto-flush threshold.
    pub fn with_high_water<P: AsRef<Path>>(path: P, high_water: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .wrap_err_with(|| format!("failed to open or create '{}'", path.display()))?;
        let map = map_writable(&file, &path)?;
        let write_pos = map.as_ref().map_or(0, |m| m.len() as Offset);
        Ok(Self {
            path,
            file,
            map,
            tail: TailBuffer::new(),
            write_pos,
            high_water,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mapped_len(&self) -> usize {
        self.map.as_ref().map_or(0, |m| m.len())
    }

    /// Total bytes visible: mapped region plus unflushed tail.
    pub fn len(&self) -> Offset {
        (self.mapped_len() + self.tail.len()) as Offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_offset(&self) -> Offset {
        self.write_pos
    }

    pub fn seek(&mut self, offset: Offset) {
        debug_assert!(
            offset >= 0 && offset <= self.len(),
            "seek to {} outside [0, {}]",
            offset,
            self.len()
        );
        self.write_pos = offset;
    }

    pub fn seek_end(&mut self) {
        self.write_pos = self.len();
    }

    /// Writes `bytes` at the cursor, splitting across the mapped prefix and
    /// the tail as needed. Returns `true` iff the tail crossed the high-water
    /// mark and was flushed as a side effect.
    pub fn write(&mut self, bytes: &[u8]) -> Result<bool> {
        let mapped = self.mapped_len();
        let mut pos = self.write_pos as usize;
        debug_assert!(
            pos <= mapped + self.tail.len(),
            "write cursor {} beyond logical end {}",
            pos,
            mapped + self.tail.len()
        );
        let mut remaining = bytes;

        // Patch the mapped prefix in place.
        if !remaining.is_empty() && pos < mapped {
            if let Some(map) = self.map.as_mut() {
                let n = remaining.len().min(mapped - pos);
                map[pos..pos + n].copy_from_slice(&remaining[..n]);
                pos += n;
                remaining = &remaining[n..];
            }
        }

        // Patch inside the tail.
        if !remaining.is_empty() && pos < mapped + self.tail.len() {
            let at = pos - mapped;
            let n = remaining.len().min(self.tail.len() - at);
            self.tail.as_mut_slice()[at..at + n].copy_from_slice(&remaining[..n]);
            pos += n;
            remaining = &remaining[n..];
        }

        // Append the rest at the logical end.
        if !remaining.is_empty() {
            self.tail.extend_from_slice(remaining);
            pos += remaining.len();
        }

        self.write_pos = pos as Offset;

        if self.tail.len() > self.high_water {
            self.flush()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Typed convenience: writes the record's native representation.
    pub fn write_record<T: Record>(&mut self, record: &T) -> Result<bool> {
        self.write(record.as_bytes())
    }

    /// Borrow of the bytes from `offset` to the end of the region holding it
    /// (mapped prefix or tail). `None` iff `offset` is [`INVALID_OFFSET`]; an
    /// out-of-range offset panics on the slice rather than reading as absent.
    ///
    /// Flushes only happen between whole writes, so a record written in one
    /// `write` call never straddles the two regions.
    pub fn bytes_at(&self, offset: Offset) -> Option<&[u8]> {
        if offset == INVALID_OFFSET {
            return None;
        }
        debug_assert!(
            offset >= 0 && offset < self.len(),
            "offset {} out of bounds (len={})",
            offset,
            self.len()
        );
        let mapped = self.mapped_len();
        if (offset as usize) < mapped {
            Some(&self.map.as_deref()?[offset as usize..])
        } else {
            Some(&self.tail.as_slice()[offset as usize - mapped..])
        }
    }

    /// Mutable twin of [`ByteFileMut::bytes_at`].
    pub fn bytes_at_mut(&mut self, offset: Offset) -> Option<&mut [u8]> {
        if offset == INVALID_OFFSET {
            return None;
        }
        debug_assert!(
            offset >= 0 && offset < self.len(),
            "offset {} out of bounds (len={})",
            offset,
            self.len()
        );
        let mapped = self.mapped_len();
        if (offset as usize) < mapped {
            Some(&mut self.map.as_deref_mut()?[offset as usize..])
        } else {
            Some(&mut self.tail.as_mut_slice()[offset as usize - mapped..])
        }
    }

    /// Persists in-place patches, appends the tail to the file, clears it,
    /// and remaps. Idempotent; a no-op when nothing is pending.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(map) = self.map.as_ref() {
            map.flush()
                .wrap_err_with(|| format!("failed to flush mapping of '{}'", self.path.display()))?;
        }
        if self.tail.is_empty() {
            return Ok(());
        }
        let mapped = self.mapped_len() as u64;
        (&self.file)
            .seek(SeekFrom::Start(mapped))
            .wrap_err_with(|| format!("failed to seek in '{}'", self.path.display()))?;
        (&self.file)
            .write_all(self.tail.as_slice())
            .wrap_err_with(|| {
                format!(
                    "failed to append {} buffered bytes to '{}'",
                    self.tail.len(),
                    self.path.display()
                )
            })?;
        self.tail.clear();
        self.remap()?;
        Ok(())
    }

    /// Flushes, resizes the file to `offset` bytes (zero-filling on growth),
    /// remaps, and clamps the cursor to the new length.
    pub fn truncate(&mut self, offset: Offset) -> Result<()> {
        ensure!(
            offset >= 0,
            "cannot resize '{}' to negative length {}",
            self.path.display(),
            offset
        );
        self.flush()?;
        self.file.set_len(offset as u64).wrap_err_with(|| {
            format!(
                "failed to resize '{}' to {} bytes",
                self.path.display(),
                offset
            )
        })?;
        self.remap()?;
        self.write_pos = self.write_pos.min(self.len());
        Ok(())
    }

    /// Flushes pending writes, then remaps if the on-disk size moved under us
    /// (another mapper instance appended and flushed).
    pub fn reload(&mut self) -> Result<()> {
        self.flush()?;
        let disk = self
            .file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?
            .len();
        if disk != self.mapped_len() as u64 {
            self.remap()?;
            self.write_pos = self.write_pos.min(self.len());
        }
        Ok(())
    }

    fn remap(&mut self) -> Result<()> {
        self.map = map_writable(&self.file, &self.path)?;
        Ok(())
    }
}

impl ByteStore for ByteFileMut {
    fn open(path: &Path) -> Result<Self> {
        ByteFileMut::open(path)
    }

    fn len(&self) -> Offset {
        ByteFileMut::len(self)
    }

    fn bytes_at(&self, offset: Offset) -> Option<&[u8]> {
        ByteFileMut::bytes_at(self, offset)
    }

    fn reload(&mut self) -> Result<()> {
        ByteFileMut::reload(self)
    }
}

impl Drop for ByteFileMut {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

fn map_readonly(path: &Path) -> Result<Option<Mmap>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).wrap_err_with(|| format!("failed to open '{}'", path.display()));
        }
    };
    let len = file
        .metadata()
        .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?
        .len();
    if len == 0 {
        return Ok(None);
    }
    // SAFETY: Mmap::map is unsafe because the file could change under the
    // mapping. This is safe under the layout contract because:
    // 1. The single writer only appends and flushes; it never shrinks the
    //    file while readers are live (truncation is coordinated above us).
    // 2. Appends land beyond this mapping's end, so the mapped snapshot is
    //    stable until the reader chooses to reload.
    // 3. The mapping's lifetime is tied to ByteFile, and reload takes
    //    &mut self, so no borrow survives a remap.
    let map = unsafe { Mmap::map(&file) }
        .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?;
    Ok(Some(map))
}

fn map_writable(file: &File, path: &Path) -> Result<Option<MmapMut>> {
    let len = file
        .metadata()
        .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?
        .len();
    if len == 0 {
        return Ok(None);
    }
    // SAFETY: MmapMut::map_mut is unsafe because external modification of the
    // file would invalidate the mapping. This is safe because:
    // 1. One ByteFileMut owns the write side of a path; the layout contract
    //    admits no second writer.
    // 2. Remapping (flush/truncate/reload) takes &mut self, so the borrow
    //    checker proves no slice into the old mapping survives it.
    // 3. Assigning the new mapping drops the old one; a mapping never
    //    outlives the ByteFileMut that owns it.
    let map = unsafe { MmapMut::map_mut(file) }
        .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?;
    Ok(Some(map))
}
