//! Synthetic VSS region builder shared by the integration tests: encodes a
//! whole image in memory so the suite can parse it back and check the
//! resolved bytes against known ground truth. Mirrors
//! `moses-filesystems`'s "format then read back" fixture style, here
//! adapted to "encode then parse and resolve".

#![allow(dead_code)]

use ntvss::structures::{
    RecordType, BLOCK_DESCRIPTOR_SIZE, BLOCK_DESCRIPTORS_PER_BLOCK, BLOCK_SIZE,
    CATALOG_ENTRIES_PER_BLOCK, CATALOG_ENTRY_SIZE, CHAIN_HEADER_SIZE, VOLUME_HEADER_OFFSET,
    VSS_SIGNATURE,
};

pub const NTFS_OEM_ID: &[u8; 8] = b"NTFS    ";

/// Install the `env_logger` subscriber once so `LogObserver`'s `log::debug!`
/// calls are visible under `cargo test -- --nocapture`; harmless to call
/// from every test.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

#[derive(Debug, Clone, Copy)]
pub enum Descriptor {
    Copied { original_offset: u64, image_offset: u64 },
    Forwarded { original_offset: u64, target_store: usize },
    Overlay { original_offset: u64, bitmap: u32, image_offset: u64 },
    NotUsed { original_offset: u64 },
}

pub struct StoreSpec {
    pub sequence_number: u64,
    pub creation_time: u64,
    /// Block indices (original_offset / BLOCK_SIZE) explicitly cleared in
    /// this store's bitmap; every other block up to `bitmap_blocks` is set.
    pub bitmap_cleared: Vec<u64>,
    pub descriptors: Vec<Descriptor>,
}

impl StoreSpec {
    pub fn new(sequence_number: u64) -> Self {
        Self {
            sequence_number,
            creation_time: 0,
            bitmap_cleared: Vec::new(),
            descriptors: Vec::new(),
        }
    }

    pub fn with_descriptor(mut self, d: Descriptor) -> Self {
        self.descriptors.push(d);
        self
    }

    pub fn with_cleared_bit(mut self, block_index: u64) -> Self {
        self.bitmap_cleared.push(block_index);
        self
    }
}

/// A bump allocator over 16,384-byte blocks, starting well clear of the
/// boot sector and volume header.
struct BlockAllocator {
    next: u64,
}

impl BlockAllocator {
    fn new(start: u64) -> Self {
        Self { next: start }
    }

    fn alloc(&mut self) -> u64 {
        let addr = self.next;
        self.next += BLOCK_SIZE;
        addr
    }
}

pub struct Fixture {
    pub volume_offset: u64,
    pub volume_size: u64,
    pub data: Vec<u8>,
}

impl Fixture {
    fn ensure_len(&mut self, end: u64) {
        if (self.data.len() as u64) < end {
            self.data.resize(end as usize, 0);
        }
    }

    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) {
        self.ensure_len(offset + bytes.len() as u64);
        self.data[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
    }

    /// Write bytes as they existed on the live volume at `original_offset`.
    pub fn set_live_bytes(&mut self, original_offset: u64, bytes: &[u8]) {
        let addr = self.volume_offset + original_offset;
        self.write_at(addr, bytes);
    }

    /// A deterministic, position-derived fill pattern so tests can assert
    /// byte identity without hand-writing literals everywhere.
    pub fn pattern(tag: u8, len: usize) -> Vec<u8> {
        (0..len).map(|i| tag.wrapping_add(i as u8)).collect()
    }
}

fn write_chain_header(
    fixture: &mut Fixture,
    self_offset: u64,
    region_base: u64,
    record_type: RecordType,
    next_offset: u64,
) {
    let mut header = vec![0u8; CHAIN_HEADER_SIZE];
    header[0..16].copy_from_slice(&VSS_SIGNATURE);
    header[16..20].copy_from_slice(&(record_type as u32).to_le_bytes());
    let index = (self_offset - region_base) / BLOCK_SIZE;
    header[20..24].copy_from_slice(&(index as u32).to_le_bytes());
    header[24..32].copy_from_slice(&next_offset.to_le_bytes());
    fixture.write_at(self_offset, &header);
}

fn write_block_descriptor(
    fixture: &mut Fixture,
    block_offset: u64,
    slot: usize,
    original_offset: u64,
    relative_store_offset: u64,
    store_offset: u64,
    flags: u32,
    allocation_bitmap: u32,
) {
    let start = block_offset + CHAIN_HEADER_SIZE as u64 + (slot * BLOCK_DESCRIPTOR_SIZE) as u64;
    let mut buf = [0u8; BLOCK_DESCRIPTOR_SIZE];
    buf[0..8].copy_from_slice(&original_offset.to_le_bytes());
    buf[8..16].copy_from_slice(&relative_store_offset.to_le_bytes());
    buf[16..24].copy_from_slice(&store_offset.to_le_bytes());
    buf[24..28].copy_from_slice(&flags.to_le_bytes());
    buf[28..32].copy_from_slice(&allocation_bitmap.to_le_bytes());
    fixture.write_at(start, &buf);
}

const FLAG_FORWARDER: u32 = 0x0000_0001;
const FLAG_OVERLAY: u32 = 0x0000_0002;
const FLAG_NOT_USED: u32 = 0x0000_0004;

/// Build a full synthetic image: boot sector, volume header, catalog
/// chain and per-store block-list/bitmap chains, for the given stores (in
/// the order supplied; `Descriptor::Forwarded::target_store` indexes into
/// this same slice).
pub fn build(volume_offset: u64, volume_size: u64, stores: &[StoreSpec]) -> Fixture {
    let region_base = volume_offset;
    let mut fixture = Fixture {
        volume_offset,
        volume_size,
        data: Vec::new(),
    };

    // Boot sector.
    let bytes_per_sector: u16 = 512;
    let sectors_in_volume = volume_size / bytes_per_sector as u64;
    let mut boot = vec![0u8; 512];
    boot[3..11].copy_from_slice(NTFS_OEM_ID);
    boot[0x0b..0x0d].copy_from_slice(&bytes_per_sector.to_le_bytes());
    boot[0x28..0x30].copy_from_slice(&sectors_in_volume.to_le_bytes());
    fixture.write_at(volume_offset, &boot);

    // Leave the volume-header block (region_base+0x4000 aligned slot that
    // contains region_base+0x1e00) untouched by the block allocator.
    let mut alloc = BlockAllocator::new(region_base + BLOCK_SIZE * 4);

    let blocks_needed = volume_size.div_ceil(BLOCK_SIZE);

    // Pass A: allocate each store's block-list and bitmap chain heads.
    let heads: Vec<(u64, u64, u64)> = stores
        .iter()
        .map(|_| {
            let block_list = alloc.alloc();
            let bitmap = alloc.alloc();
            let store_header = alloc.alloc();
            (block_list, bitmap, store_header)
        })
        .collect();

    // Pass B: write each store's block-list chain.
    for (store, &(block_list_offset, _, _)) in stores.iter().zip(heads.iter()) {
        write_chain_header(
            &mut fixture,
            block_list_offset,
            region_base,
            RecordType::StoreBlockList,
            0,
        );
        assert!(
            store.descriptors.len() <= BLOCK_DESCRIPTORS_PER_BLOCK,
            "fixture builder only writes a single block-list block"
        );
        for (slot, d) in store.descriptors.iter().enumerate() {
            match *d {
                Descriptor::Copied { original_offset, image_offset } => {
                    write_block_descriptor(
                        &mut fixture,
                        block_list_offset,
                        slot,
                        original_offset,
                        0,
                        image_offset,
                        0,
                        0,
                    );
                }
                Descriptor::Forwarded { original_offset, target_store } => {
                    let (target_block_list, _, _) = heads[target_store];
                    write_block_descriptor(
                        &mut fixture,
                        block_list_offset,
                        slot,
                        original_offset,
                        0,
                        target_block_list,
                        FLAG_FORWARDER,
                        0,
                    );
                }
                Descriptor::Overlay { original_offset, bitmap, image_offset } => {
                    write_block_descriptor(
                        &mut fixture,
                        block_list_offset,
                        slot,
                        original_offset,
                        0,
                        image_offset,
                        FLAG_OVERLAY,
                        bitmap,
                    );
                }
                Descriptor::NotUsed { original_offset } => {
                    write_block_descriptor(
                        &mut fixture,
                        block_list_offset,
                        slot,
                        original_offset,
                        0,
                        0,
                        FLAG_NOT_USED,
                        0,
                    );
                }
            }
        }
    }

    // Pass C: write each store's bitmap chain (single block; plenty of
    // bits for any test fixture's volume_size).
    for (store, &(_, bitmap_offset, _)) in stores.iter().zip(heads.iter()) {
        write_chain_header(
            &mut fixture,
            bitmap_offset,
            region_base,
            RecordType::StoreBitmap,
            0,
        );
        let body_bits = (BLOCK_SIZE as usize - CHAIN_HEADER_SIZE) * 8;
        assert!((blocks_needed as usize) <= body_bits, "fixture bitmap needs more than one block");
        let mut body = vec![0xffu8; BLOCK_SIZE as usize - CHAIN_HEADER_SIZE];
        for &cleared in &store.bitmap_cleared {
            let byte = (cleared / 8) as usize;
            let bit = cleared % 8;
            body[byte] &= !(1 << bit);
        }
        fixture.write_at(bitmap_offset + CHAIN_HEADER_SIZE as u64, &body);
    }

    // Catalog: one block holds two entries per store (StoreInfo +
    // StoreDescriptor), comfortably within CATALOG_ENTRIES_PER_BLOCK for
    // every fixture in this suite.
    let catalog_offset = alloc.alloc();
    assert!(
        stores.len() * 2 <= CATALOG_ENTRIES_PER_BLOCK,
        "fixture builder only writes a single catalog block"
    );
    write_chain_header(&mut fixture, catalog_offset, region_base, RecordType::Catalog, 0);

    for (index, (store, &(block_list_offset, bitmap_offset, store_header_offset))) in
        stores.iter().zip(heads.iter()).enumerate()
    {
        let guid = [index as u8 + 1; 16];

        let info_slot = index * 2;
        let info_start = catalog_offset + CATALOG_ENTRY_SIZE as u64 + (info_slot * CATALOG_ENTRY_SIZE) as u64;
        let mut info = vec![0u8; CATALOG_ENTRY_SIZE];
        info[0] = 0x02;
        info[8..24].copy_from_slice(&guid);
        info[24..32].copy_from_slice(&store.creation_time.to_le_bytes());
        info[32..40].copy_from_slice(&store.sequence_number.to_le_bytes());
        fixture.write_at(info_start, &info);

        let desc_slot = index * 2 + 1;
        let desc_start = catalog_offset + CATALOG_ENTRY_SIZE as u64 + (desc_slot * CATALOG_ENTRY_SIZE) as u64;
        let mut desc = vec![0u8; CATALOG_ENTRY_SIZE];
        desc[0] = 0x03;
        desc[8..24].copy_from_slice(&guid);
        desc[24..32].copy_from_slice(&store_header_offset.to_le_bytes());
        desc[32..40].copy_from_slice(&block_list_offset.to_le_bytes());
        desc[40..48].copy_from_slice(&bitmap_offset.to_le_bytes());
        desc[48..56].copy_from_slice(&0u64.to_le_bytes());
        fixture.write_at(desc_start, &desc);
    }

    // Volume header.
    let header_offset = region_base + VOLUME_HEADER_OFFSET;
    let mut header = vec![0u8; 512];
    header[0..16].copy_from_slice(&VSS_SIGNATURE);
    header[16..20].copy_from_slice(&(RecordType::VolumeHeader as u32).to_le_bytes());
    header[24..32].copy_from_slice(&header_offset.to_le_bytes());
    header[32..40].copy_from_slice(&catalog_offset.to_le_bytes());
    fixture.write_at(header_offset, &header);

    fixture
}
