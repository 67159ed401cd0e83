//! SHA-1 verification and the trailing hash table.

use std::fmt;

use anyhow::Result;
use sha1_smol::Sha1;

use super::structures::HashRecord;
use crate::io::{ReadAt, read_exact_at};

const HASH_CHUNK: usize = 0x10000;

/// Outcome of checking a stored digest against the bytes it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub entry_id: u32,
    pub expected: [u8; 20],
    pub computed: [u8; 20],
}

impl Verification {
    pub fn is_ok(&self) -> bool {
        self.expected == self.computed
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SHA1 0x{:x} ", self.entry_id)?;
        if self.is_ok() {
            write!(f, "ok ({})", hex::encode(self.computed))
        } else {
            write!(
                f,
                "wrong (should be {} actual {})",
                hex::encode(self.expected),
                hex::encode(self.computed)
            )
        }
    }
}

/// Compute SHA-1 over `[start, end)` of `reader` and compare it with `expected`.
pub async fn verify_range<R: ReadAt + ?Sized>(
    reader: &R,
    expected: [u8; 20],
    entry_id: u32,
    start: u64,
    end: u64,
) -> Result<Verification> {
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    let mut offset = start;

    while offset < end {
        let len = ((end - offset) as usize).min(HASH_CHUNK);
        read_exact_at(reader, offset, &mut buf[..len]).await?;
        hasher.update(&buf[..len]);
        offset += len as u64;
    }

    Ok(Verification {
        entry_id,
        expected,
        computed: hasher.digest().bytes(),
    })
}

/// One item of a hash table scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashTableItem {
    /// A run of consecutive all-zero records.
    Empty(usize),
    Record(HashRecord),
    /// Bytes after the last whole record.
    Trailing(Vec<u8>),
}

/// Lazy scan over a buffer of 24-byte hash records.
///
/// A clone resumes from the same position; call [`scan_table`] again for a
/// fresh pass.
#[derive(Debug, Clone)]
pub struct HashTableScan<'a> {
    buf: &'a [u8],
    pos: usize,
}

pub fn scan_table(buf: &[u8]) -> HashTableScan<'_> {
    HashTableScan { buf, pos: 0 }
}

impl Iterator for HashTableScan<'_> {
    type Item = HashTableItem;

    fn next(&mut self) -> Option<HashTableItem> {
        let mut empty = 0;
        while self.buf.len() - self.pos >= HashRecord::SIZE {
            let raw = &self.buf[self.pos..self.pos + HashRecord::SIZE];
            match HashRecord::from_bytes(raw).ok().flatten() {
                None => {
                    empty += 1;
                    self.pos += HashRecord::SIZE;
                }
                Some(_) if empty > 0 => return Some(HashTableItem::Empty(empty)),
                Some(record) => {
                    self.pos += HashRecord::SIZE;
                    return Some(HashTableItem::Record(record));
                }
            }
        }
        if empty > 0 {
            return Some(HashTableItem::Empty(empty));
        }
        if self.pos < self.buf.len() {
            let rest = self.buf[self.pos..].to_vec();
            self.pos = self.buf.len();
            return Some(HashTableItem::Trailing(rest));
        }
        None
    }
}
