//! Snapshot resolver: given a store and a 16 KiB-aligned original-volume
//! offset, decides where the bytes for each of its sixteen 1,024-byte
//! sub-blocks actually live.

use crate::error::{Result, RuntimeErrorKind, VssError};
use crate::structures::BLOCK_SIZE;
use crate::tree::Primary;
use crate::volume::VolumeInner;

pub const SUB_BLOCK_SIZE: u64 = 1024;
pub const SUB_BLOCKS_PER_BLOCK: usize = (BLOCK_SIZE / SUB_BLOCK_SIZE) as usize;

/// Where the bytes for one 1,024-byte sub-block come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubBlockSource {
    /// Not part of the store's address space; reads return zeros.
    Zero,
    /// Read from the live volume, i.e. `region_base + original_offset`.
    InPlace,
    /// Read from this absolute image offset.
    Image(u64),
}

/// Resolve every sub-block of the 16 KiB block starting at `original_offset`
/// for the store at `store_index`. `original_offset` must already be
/// 16,384-aligned.
pub fn resolve_block(
    volume: &VolumeInner,
    store_index: usize,
    original_offset: u64,
) -> Result<[SubBlockSource; SUB_BLOCKS_PER_BLOCK]> {
    let mut visited = Vec::with_capacity(volume.stores.len());
    resolve_block_inner(volume, store_index, original_offset, &mut visited)
}

fn resolve_block_inner(
    volume: &VolumeInner,
    store_index: usize,
    original_offset: u64,
    visited: &mut Vec<usize>,
) -> Result<[SubBlockSource; SUB_BLOCKS_PER_BLOCK]> {
    const LOC: &str = "resolver::resolve_block";

    if visited.contains(&store_index) {
        return Err(VssError::runtime(LOC, RuntimeErrorKind::UnsupportedValue));
    }
    visited.push(store_index);

    let metadata = volume.ensure_store_loaded(store_index)?;

    let block_index = original_offset / BLOCK_SIZE;
    if !metadata.bitmap.get(block_index) {
        return Ok([SubBlockSource::Zero; SUB_BLOCKS_PER_BLOCK]);
    }

    let underlying = match metadata.tree.get(original_offset) {
        None => fall_through(volume, store_index, original_offset, visited)?,
        Some(entry) => {
            let base = match entry.primary {
                None => fall_through(volume, store_index, original_offset, visited)?,
                Some(Primary::Copied { image_offset }) => {
                    let mut arr = [SubBlockSource::Zero; SUB_BLOCKS_PER_BLOCK];
                    for (i, slot) in arr.iter_mut().enumerate() {
                        *slot = SubBlockSource::Image(image_offset + i as u64 * SUB_BLOCK_SIZE);
                    }
                    arr
                }
                Some(Primary::Forwarded { to }) => {
                    resolve_block_inner(volume, to, original_offset, visited)?
                }
            };

            if entry.overlays.is_empty() {
                base
            } else {
                let mut out = base;
                for overlay in &entry.overlays {
                    for sub in 0..SUB_BLOCKS_PER_BLOCK {
                        if overlay.bitmap & (1 << sub) != 0 {
                            out[sub] =
                                SubBlockSource::Image(overlay.image_offset + sub as u64 * SUB_BLOCK_SIZE);
                        }
                    }
                }
                out
            }
        }
    };

    Ok(underlying)
}

/// No entry (or an overlay-only entry with no primary): VSS stores diff
/// against a *newer* state, so reissue resolution against the next newer
/// store, or land on the live volume if this is already the newest.
fn fall_through(
    volume: &VolumeInner,
    store_index: usize,
    original_offset: u64,
    visited: &mut Vec<usize>,
) -> Result<[SubBlockSource; SUB_BLOCKS_PER_BLOCK]> {
    if store_index + 1 < volume.stores.len() {
        resolve_block_inner(volume, store_index + 1, original_offset, visited)
    } else {
        Ok([SubBlockSource::InPlace; SUB_BLOCKS_PER_BLOCK])
    }
}
