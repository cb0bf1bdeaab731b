//! Pure decoders for the fixed-layout VSS on-disk records. Every function
//! here is a pure decode over a byte slice: no I/O, signature/self-offset
//! checks only, returning a strongly typed record or an
//! [`crate::error::VssError::Input`].
//!
//! All multi-byte integers are little-endian. The concrete byte offsets
//! within each 32/128-byte header below are this implementation's own
//! layout: the upstream `libvshadow` C sources that would pin them down
//! were not available to this port (the retrieved `original_source/` tree
//! keeps only its public headers, Python bindings and CLI tools, not the
//! structure-parsing `.c` files), so the layout is derived from the known
//! constraints (16-byte signature at every header, 32-byte block
//! descriptors, 511 of them per block-list block, 128-byte catalog
//! entries, 127 of them per catalog block) and kept internally consistent
//! rather than guessed at the call site.

use bitflags::bitflags;

use crate::error::{InputErrorKind, Result, VssError};
use crate::guid::{FileTime, Guid};

/// Every VSS record starts with this 16-byte constant.
pub const VSS_SIGNATURE: [u8; 16] = [
    0x6B, 0x87, 0x08, 0x38, 0x76, 0xC1, 0x48, 0x4E, 0xB7, 0xAE, 0x04, 0x04, 0x6E, 0x6E, 0xD8, 0xA0,
];

/// All VSS blocks are fixed at this size.
pub const BLOCK_SIZE: u64 = 0x4000;

/// Offset of the volume header from the start of the VSS region.
pub const VOLUME_HEADER_OFFSET: u64 = 0x1e00;

/// Size of the portion of the volume header block actually used.
pub const VOLUME_HEADER_USED_SIZE: usize = 512;

/// Size of one catalog entry slot (and of the catalog block's own header).
pub const CATALOG_ENTRY_SIZE: usize = 128;
/// Number of catalog entries following a catalog block's header.
pub const CATALOG_ENTRIES_PER_BLOCK: usize = 127;

/// Size of one block descriptor (and, for block-list chains, the space a
/// chain header occupies at the start of the block).
pub const BLOCK_DESCRIPTOR_SIZE: usize = 32;
/// Number of block descriptors following a block-list block's header.
pub const BLOCK_DESCRIPTORS_PER_BLOCK: usize = 511;

/// A chain header's own size for block-list/range/bitmap chains.
pub const CHAIN_HEADER_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RecordType {
    VolumeHeader = 1,
    Catalog = 2,
    StoreBlockList = 3,
    StoreDescriptor = 4,
    StoreBlockRange = 5,
    StoreBitmap = 6,
}

impl RecordType {
    fn matches(self, value: u32) -> bool {
        value == self as u32
    }
}

fn check_signature(data: &[u8], location: &'static str) -> Result<()> {
    if data.len() < 16 || data[0..16] != VSS_SIGNATURE {
        return Err(VssError::input(location, InputErrorKind::SignatureMismatch));
    }
    Ok(())
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().expect("4 bytes"))
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(data[offset..offset + 8].try_into().expect("8 bytes"))
}

fn read_guid(data: &[u8], offset: usize) -> Guid {
    let bytes: [u8; 16] = data[offset..offset + 16].try_into().expect("16 bytes");
    Guid::from_bytes(&bytes)
}

// ---------------------------------------------------------------------
// Volume header (record type 1)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct VolumeHeader {
    pub catalog_offset: u64,
}

/// Decode the volume header. `self_offset` is the absolute offset the data
/// was read from (`volume_offset + VOLUME_HEADER_OFFSET`); the on-disk
/// self-reference field must equal it, which catches a relocated or
/// corrupt image before any catalog chain is walked.
pub fn decode_volume_header(data: &[u8], self_offset: u64) -> Result<VolumeHeader> {
    const LOC: &str = "structures::decode_volume_header";
    if data.len() < VOLUME_HEADER_USED_SIZE {
        return Err(VssError::input(LOC, InputErrorKind::InvalidDescriptor));
    }
    check_signature(data, LOC)?;

    let record_type = read_u32(data, 16);
    if !RecordType::VolumeHeader.matches(record_type) {
        return Err(VssError::input(LOC, InputErrorKind::InvalidDescriptor));
    }

    let current_offset = read_u64(data, 24);
    if current_offset != self_offset {
        return Err(VssError::input(LOC, InputErrorKind::ValueMismatch));
    }

    let catalog_offset = read_u64(data, 32);
    Ok(VolumeHeader { catalog_offset })
}

// ---------------------------------------------------------------------
// Shared chain header (catalog / block-list / block-range / bitmap)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ChainHeader {
    pub next_offset: u64,
}

/// Decode the common chain-block header shared by catalog, block-list,
/// block-range and bitmap blocks: a signature, a record type, a
/// self-referential block index (validated against `region_base` and
/// `self_offset`) and a next-block absolute offset (0 terminates the
/// chain).
fn decode_chain_header(
    data: &[u8],
    self_offset: u64,
    region_base: u64,
    expected: RecordType,
    location: &'static str,
) -> Result<ChainHeader> {
    if data.len() < CHAIN_HEADER_SIZE {
        return Err(VssError::input(location, InputErrorKind::InvalidDescriptor));
    }
    check_signature(data, location)?;

    let record_type = read_u32(data, 16);
    if !expected.matches(record_type) {
        return Err(VssError::input(location, InputErrorKind::InvalidDescriptor));
    }

    let relative_block_index = read_u32(data, 20) as u64;
    let expected_self = region_base + relative_block_index * BLOCK_SIZE;
    if expected_self != self_offset {
        return Err(VssError::input(location, InputErrorKind::ValueMismatch));
    }

    let next_offset = read_u64(data, 24);
    Ok(ChainHeader { next_offset })
}

pub fn decode_catalog_block_header(
    data: &[u8],
    self_offset: u64,
    region_base: u64,
) -> Result<ChainHeader> {
    decode_chain_header(
        data,
        self_offset,
        region_base,
        RecordType::Catalog,
        "structures::decode_catalog_block_header",
    )
}

pub fn decode_block_list_header(
    data: &[u8],
    self_offset: u64,
    region_base: u64,
) -> Result<ChainHeader> {
    decode_chain_header(
        data,
        self_offset,
        region_base,
        RecordType::StoreBlockList,
        "structures::decode_block_list_header",
    )
}

pub fn decode_block_range_header(
    data: &[u8],
    self_offset: u64,
    region_base: u64,
) -> Result<ChainHeader> {
    decode_chain_header(
        data,
        self_offset,
        region_base,
        RecordType::StoreBlockRange,
        "structures::decode_block_range_header",
    )
}

pub fn decode_store_bitmap_header(
    data: &[u8],
    self_offset: u64,
    region_base: u64,
) -> Result<ChainHeader> {
    decode_chain_header(
        data,
        self_offset,
        region_base,
        RecordType::StoreBitmap,
        "structures::decode_store_bitmap_header",
    )
}

// ---------------------------------------------------------------------
// Catalog entries (128 bytes each, inside a catalog block's body)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct StoreInformation {
    pub store_id: Guid,
    pub creation_time: FileTime,
    pub sequence_number: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreDescriptorEntry {
    pub store_id: Guid,
    pub store_header_offset: u64,
    pub block_list_offset: u64,
    pub bitmap_offset: u64,
    pub previous_bitmap_offset: u64,
}

#[derive(Debug, Clone, Copy)]
pub enum CatalogEntry {
    /// 0x00 — block terminator; not a real entry.
    Terminator,
    /// 0x01 — unused slot.
    Empty,
    StoreInfo(StoreInformation),
    StoreDescriptor(StoreDescriptorEntry),
}

pub fn decode_catalog_entry(data: &[u8]) -> Result<CatalogEntry> {
    const LOC: &str = "structures::decode_catalog_entry";
    if data.len() < CATALOG_ENTRY_SIZE {
        return Err(VssError::input(LOC, InputErrorKind::InvalidDescriptor));
    }

    match data[0] {
        0x00 => Ok(CatalogEntry::Terminator),
        0x01 => Ok(CatalogEntry::Empty),
        0x02 => Ok(CatalogEntry::StoreInfo(StoreInformation {
            store_id: read_guid(data, 8),
            creation_time: read_u64(data, 24),
            sequence_number: read_u64(data, 32),
        })),
        0x03 => Ok(CatalogEntry::StoreDescriptor(StoreDescriptorEntry {
            store_id: read_guid(data, 8),
            store_header_offset: read_u64(data, 24),
            block_list_offset: read_u64(data, 32),
            bitmap_offset: read_u64(data, 40),
            previous_bitmap_offset: read_u64(data, 48),
        })),
        _ => Err(VssError::input(LOC, InputErrorKind::InvalidDescriptor)),
    }
}

// ---------------------------------------------------------------------
// Block descriptors (32 bytes each, inside a block-list block's body)
// ---------------------------------------------------------------------

bitflags! {
    /// Flags on a raw block descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BlockDescriptorFlags: u32 {
        const IS_FORWARDER = 0x0000_0001;
        const IS_OVERLAY   = 0x0000_0002;
        const NOT_USED     = 0x0000_0004;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RawBlockDescriptor {
    pub original_offset: u64,
    pub relative_store_offset: u64,
    pub store_offset: u64,
    pub flags: BlockDescriptorFlags,
    pub allocation_bitmap: u32,
}

pub fn decode_block_descriptor(data: &[u8]) -> Result<RawBlockDescriptor> {
    const LOC: &str = "structures::decode_block_descriptor";
    if data.len() < BLOCK_DESCRIPTOR_SIZE {
        return Err(VssError::input(LOC, InputErrorKind::InvalidDescriptor));
    }
    Ok(RawBlockDescriptor {
        original_offset: read_u64(data, 0),
        relative_store_offset: read_u64(data, 8),
        store_offset: read_u64(data, 16),
        flags: BlockDescriptorFlags::from_bits_truncate(read_u32(data, 24)),
        allocation_bitmap: read_u32(data, 28),
    })
}
