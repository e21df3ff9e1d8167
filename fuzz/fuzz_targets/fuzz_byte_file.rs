//! Fuzz testing for the writable byte mapper.
//!
//! Drives arbitrary seek/write/flush/truncate sequences against a plain
//! `Vec<u8>` reference model and checks that the mapper's logical content
//! matches at every step, across the mapped-prefix/tail-buffer split and
//! auto-flush boundaries.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use chainfile::ByteFileMut;

const MAX_OPS: usize = 64;
const MAX_WRITE: usize = 2048;
const MAX_FILE: usize = 4096;
const HIGH_WATER: usize = 512;

#[derive(Debug, Arbitrary)]
enum Op {
    Write(Vec<u8>),
    Seek(u16),
    Flush,
    Truncate(u16),
}

fuzz_target!(|ops: Vec<Op>| {
    let dir = tempfile::tempdir().unwrap();
    let mut file = ByteFileMut::with_high_water(dir.path().join("fuzz.dat"), HIGH_WATER).unwrap();

    let mut model: Vec<u8> = Vec::new();
    let mut cursor = 0usize;

    for op in ops.iter().take(MAX_OPS) {
        match op {
            Op::Write(bytes) => {
                let bytes = &bytes[..bytes.len().min(MAX_WRITE)];
                file.write(bytes).unwrap();
                let end = cursor + bytes.len();
                if model.len() < end {
                    model.resize(end, 0);
                }
                model[cursor..end].copy_from_slice(bytes);
                cursor = end;
            }
            Op::Seek(pos) => {
                let pos = (*pos as usize).min(model.len());
                file.seek(pos as i64);
                cursor = pos;
            }
            Op::Flush => {
                file.flush().unwrap();
            }
            Op::Truncate(len) => {
                let len = (*len as usize).min(MAX_FILE);
                file.truncate(len as i64).unwrap();
                model.resize(len, 0);
                cursor = cursor.min(len);
            }
        }
        assert_eq!(file.len() as usize, model.len());
        assert_eq!(file.write_offset() as usize, cursor);
    }

    file.flush().unwrap();
    if !model.is_empty() {
        assert_eq!(file.bytes_at(0).unwrap(), &model[..]);
    }
});
