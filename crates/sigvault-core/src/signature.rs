//! Per-block weak and strong checksums for a single file.
//!
//! The weak checksum is an Adler-32 variant chosen for its O(1) rolling
//! update: sliding the window one byte only touches the two sums, never
//! the whole window. The strong checksum is SHA-256 and is only computed
//! to confirm a weak match.

use std::io::Read;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sigvault_types::StrongHash;

use crate::error::Result;

const MOD: u32 = 65521;

/// Rolling Adler-style checksum over a byte window.
///
/// `a` is the plain byte sum, `b` the position-weighted sum (the first
/// byte of the window carries the highest weight). Both are kept reduced
/// mod the largest prime below 2^16 so the combined digest fits 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingChecksum {
    a: u32,
    b: u32,
    count: usize,
}

impl RollingChecksum {
    /// Checksum of an initial window.
    pub fn new(data: &[u8]) -> Self {
        let len = data.len();
        let mut a: u64 = 0;
        let mut b: u64 = 0;
        for (i, &byte) in data.iter().enumerate() {
            a += u64::from(byte);
            b += (len - i) as u64 * u64::from(byte);
        }
        RollingChecksum {
            a: (a % u64::from(MOD)) as u32,
            b: (b % u64::from(MOD)) as u32,
            count: len,
        }
    }

    /// Slide the window one byte: drop `old_byte` from the front, append
    /// `new_byte`. O(1); equivalent to recomputing `new` over the shifted
    /// window.
    #[inline]
    pub fn roll(&mut self, old_byte: u8, new_byte: u8) {
        let old = i64::from(old_byte);
        let new = i64::from(new_byte);
        let m = i64::from(MOD);

        let a = (i64::from(self.a) - old + new).rem_euclid(m);
        // b loses the old byte's full-window weight and gains the new sum.
        let b = (i64::from(self.b) - self.count as i64 * old + a).rem_euclid(m);

        self.a = a as u32;
        self.b = b as u32;
    }

    /// Combined 32-bit digest: `(b << 16) | a`.
    #[inline]
    pub fn digest(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

/// Weak and strong checksum of one fixed-size block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub weak: u32,
    pub strong: StrongHash,
}

/// Ordered per-block checksums of a file, plus the geometry needed to
/// interpret them. Immutable once computed; lives for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSignature {
    pub block_size: usize,
    pub file_length: u64,
    pub blocks: Vec<Block>,
}

impl BlockSignature {
    /// Read the stream to the end in `block_size` chunks and checksum each
    /// one. The final block may be short; block count is always
    /// ceil(file_length / block_size).
    pub fn compute<R: Read>(mut reader: R, block_size: usize) -> Result<BlockSignature> {
        let mut blocks = Vec::new();
        let mut file_length: u64 = 0;
        let mut buf = vec![0u8; block_size];

        loop {
            let n = read_block(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            let chunk = &buf[..n];
            blocks.push(Block {
                weak: RollingChecksum::new(chunk).digest(),
                strong: StrongHash::compute(chunk),
            });
            file_length += n as u64;
            if n < block_size {
                break;
            }
        }

        Ok(BlockSignature {
            block_size,
            file_length,
            blocks,
        })
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Byte length of block `index` (the last block may be short).
    pub fn block_len(&self, index: usize) -> u64 {
        let offset = index as u64 * self.block_size as u64;
        (self.file_length - offset).min(self.block_size as u64)
    }
}

/// Hash a whole stream, returning its content digest and byte length.
pub fn hash_stream<R: Read>(mut reader: R) -> Result<(StrongHash, u64)> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut len: u64 = 0;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        len += n as u64;
    }
    Ok((StrongHash::from_digest(hasher), len))
}

/// Fill `buf` as far as the stream allows; short reads are retried until
/// EOF so a block is only short at the end of the file.
pub(crate) fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
