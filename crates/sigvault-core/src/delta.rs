//! Delta computation and application between a byte stream and a prior
//! [`BlockSignature`].
//!
//! `diff` slides a block-sized window over the new bytes, using the weak
//! rolling checksum as a cheap filter and the strong checksum to confirm.
//! Matched blocks become `Copy` instructions, everything else accumulates
//! into coalesced `Literal` instructions. `patch` replays the instruction
//! sequence against the old bytes to reconstruct the new ones.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};

use serde::{Deserialize, Serialize};
use sigvault_types::StrongHash;

use crate::error::{Result, SigvaultError};
use crate::signature::{BlockSignature, RollingChecksum};

/// A single reconstruction instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaOp {
    /// Copy block `index` from the old file.
    Copy { index: u32 },
    /// Emit these bytes verbatim.
    Literal { data: Vec<u8> },
}

/// Ordered instruction sequence reconstructing a new file from an old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// Block size of the signature this delta was computed against.
    pub block_size: usize,
    pub ops: Vec<DeltaOp>,
}

impl Delta {
    /// Reject application against a signature with a different block size.
    pub fn check_block_size(&self, sig: &BlockSignature) -> Result<()> {
        if self.block_size != sig.block_size {
            return Err(SigvaultError::SignatureMismatch {
                expected: self.block_size,
                found: sig.block_size,
            });
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Delta> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

/// Compute the delta turning the old file (described by `old_sig`) into
/// `new_bytes`.
///
/// Candidate blocks sharing a weak checksum are tried in ascending block
/// index order; the first strong-checksum match wins. A match consumes a
/// whole block (non-overlapping); a miss slides the window by one byte
/// and extends the pending literal.
pub fn diff(new_bytes: &[u8], old_sig: &BlockSignature) -> Delta {
    let block_size = old_sig.block_size;
    let len = new_bytes.len();

    // weak digest -> block indexes, in ascending order.
    let mut weak_map: HashMap<u32, Vec<u32>> = HashMap::new();
    for (i, block) in old_sig.blocks.iter().enumerate() {
        weak_map.entry(block.weak).or_default().push(i as u32);
    }

    let mut ops: Vec<DeltaOp> = Vec::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut pos = 0usize;
    // Rolling state for the full-size window starting at `pos`, if any.
    let mut rolling: Option<RollingChecksum> = None;

    while pos < len {
        let window_len = block_size.min(len - pos);
        let window = &new_bytes[pos..pos + window_len];

        let weak = if window_len == block_size {
            let state = rolling.get_or_insert_with(|| RollingChecksum::new(window));
            state.digest()
        } else {
            // Tail windows shrink below block_size; recompute directly.
            // At most block_size positions, so still O(n) overall.
            RollingChecksum::new(window).digest()
        };

        let matched = weak_map.get(&weak).and_then(|candidates| {
            let strong = StrongHash::compute(window);
            candidates
                .iter()
                .copied()
                .find(|&i| {
                    old_sig.block_len(i as usize) == window_len as u64
                        && old_sig.blocks[i as usize].strong == strong
                })
        });

        match matched {
            Some(index) => {
                if !pending.is_empty() {
                    ops.push(DeltaOp::Literal {
                        data: std::mem::take(&mut pending),
                    });
                }
                ops.push(DeltaOp::Copy { index });
                pos += window_len;
                rolling = None;
            }
            None => {
                pending.push(new_bytes[pos]);
                if window_len == block_size && pos + block_size < len {
                    if let Some(state) = rolling.as_mut() {
                        state.roll(new_bytes[pos], new_bytes[pos + block_size]);
                    }
                } else {
                    rolling = None;
                }
                pos += 1;
            }
        }
    }

    if !pending.is_empty() {
        ops.push(DeltaOp::Literal { data: pending });
    }

    Delta { block_size, ops }
}

/// Replay `delta` against the old bytes, writing the reconstructed file
/// to `out`. The old stream must support seeking; `Copy` instructions
/// address it by block offset.
pub fn patch<R: Read + Seek, W: Write>(old: &mut R, delta: &Delta, out: &mut W) -> Result<()> {
    let old_len = old.seek(SeekFrom::End(0))?;
    let block_size = delta.block_size as u64;
    let block_count = old_len.div_ceil(block_size) as u32;

    let mut buf = vec![0u8; delta.block_size];
    for op in &delta.ops {
        match op {
            DeltaOp::Copy { index } => {
                if *index >= block_count {
                    return Err(SigvaultError::CorruptDelta {
                        index: *index,
                        block_count,
                    });
                }
                let offset = u64::from(*index) * block_size;
                let take = (old_len - offset).min(block_size) as usize;
                old.seek(SeekFrom::Start(offset))?;
                old.read_exact(&mut buf[..take])?;
                out.write_all(&buf[..take])?;
            }
            DeltaOp::Literal { data } => {
                out.write_all(data)?;
            }
        }
    }
    Ok(())
}
