//! Variable-length payload assembly.
//!
//! A payload is a fixed head record followed by a type-erased tail (for
//! example a transaction head followed by its input and output arrays). The
//! payload is staged in memory, zero-padded to the head's alignment, and
//! handed to the data file as one write so later records stay aligned.

use std::marker::PhantomData;
use std::mem::align_of;

use zerocopy::IntoBytes;

use super::{Offset, Record};

/// Head types of variable-length payloads report their own total on-disk
/// size (head plus tail), used to reserve the staging buffer up front.
pub trait VarSized: Record {
    fn real_size(&self) -> usize;
}

/// Staging buffer for one variable-length payload.
pub struct VarRecord<T: VarSized> {
    bytes: Vec<u8>,
    _head: PhantomData<T>,
}

impl<T: VarSized> VarRecord<T> {
    pub fn new(head: &T) -> Self {
        let mut bytes = Vec::with_capacity(head.real_size());
        bytes.extend_from_slice(head.as_bytes());
        Self {
            bytes,
            _head: PhantomData,
        }
    }

    /// Appends one fixed-size item to the tail.
    pub fn push<U: Record>(&mut self, item: &U) {
        self.bytes.extend_from_slice(item.as_bytes());
    }

    /// Appends a run of fixed-size items to the tail.
    pub fn extend<'a, U, I>(&mut self, items: I)
    where
        U: Record + 'a,
        I: IntoIterator<Item = &'a U>,
    {
        for item in items {
            self.push(item);
        }
    }

    /// Current payload size in bytes, before any final padding.
    pub fn size(&self) -> Offset {
        self.bytes.len() as Offset
    }

    /// Pads with trailing zeros to a multiple of the head's alignment and
    /// returns the finished bytes. Safe to call more than once.
    pub fn finalize(&mut self) -> &[u8] {
        let align = align_of::<T>();
        let rem = self.bytes.len() % align;
        if rem != 0 {
            self.bytes.resize(self.bytes.len() + (align - rem), 0);
        }
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

    #[repr(C)]
    #[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
    struct Head {
        total: u64,
        count: u32,
        flags: u32,
    }

    impl VarSized for Head {
        fn real_size(&self) -> usize {
            self.total as usize
        }
    }

    #[test]
    fn starts_with_the_head_bytes() {
        let head = Head {
            total: 36,
            count: 5,
            flags: 1,
        };
        let payload = VarRecord::new(&head);
        assert_eq!(payload.size(), 16);
    }

    #[test]
    fn finalize_pads_to_head_alignment() {
        let head = Head {
            total: 20,
            count: 1,
            flags: 0,
        };
        let mut payload = VarRecord::new(&head);
        payload.push(&0xDEAD_BEEFu32);
        assert_eq!(payload.size(), 20);

        let bytes = payload.finalize();
        assert_eq!(bytes.len(), 24, "20 rounded up to align 8");
        assert_eq!(&bytes[20..], &[0, 0, 0, 0]);
    }

    #[test]
    fn finalize_is_stable_when_already_aligned() {
        let head = Head {
            total: 16,
            count: 0,
            flags: 0,
        };
        let mut payload = VarRecord::new(&head);
        assert_eq!(payload.finalize().len(), 16);
        assert_eq!(payload.finalize().len(), 16);
    }

    #[test]
    fn extend_appends_each_item() {
        let head = Head {
            total: 40,
            count: 3,
            flags: 0,
        };
        let mut payload = VarRecord::new(&head);
        payload.extend([1u64, 2, 3].iter());
        assert_eq!(payload.size(), 16 + 24);
    }
}
