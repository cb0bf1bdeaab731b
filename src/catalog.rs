//! Catalog scanner: walks the linked chain of catalog blocks starting at
//! the volume header and enumerates every store present on the volume.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{InputErrorKind, Result, RuntimeErrorKind, VssError};
use crate::guid::Guid;
use crate::observer::{Event, Observer};
use crate::reader::{read_exact_at, ByteReader};
use crate::structures::{
    decode_catalog_block_header, decode_catalog_entry, CatalogEntry, StoreDescriptorEntry,
    StoreInformation, BLOCK_SIZE, CATALOG_ENTRIES_PER_BLOCK, CATALOG_ENTRY_SIZE,
};

/// One fully paired catalog record: a store's identity plus the absolute
/// offsets of its three metadata chains.
#[derive(Debug, Clone, Copy)]
pub struct CatalogRecord {
    pub info: StoreInformation,
    pub descriptor: StoreDescriptorEntry,
}

fn check_abort(abort: &AtomicBool, location: &'static str) -> Result<()> {
    if abort.load(Ordering::Acquire) {
        return Err(VssError::runtime(location, RuntimeErrorKind::AbortRequested));
    }
    Ok(())
}

/// Walk the catalog chain starting at `catalog_offset`, returning every
/// `(StoreInformation, StoreDescriptorEntry)` pair found, in scan order.
/// Sorting by sequence number into the caller-visible `store_index` is left
/// to the caller (done in `Volume::open`), since stores are meant to be
/// exposed oldest-to-newest regardless of the order they appear on disk.
pub fn scan_catalog(
    reader: &dyn ByteReader,
    region_base: u64,
    catalog_offset: u64,
    observer: &dyn Observer,
    abort: &AtomicBool,
) -> Result<Vec<CatalogRecord>> {
    const LOC: &str = "catalog::scan_catalog";
    let mut records = Vec::new();
    // Most recently seen StoreInformation per GUID; the rare case of a GUID
    // appearing more than once before its descriptor is resolved as
    // "last wins" rather than "first wins".
    let mut pending: Vec<(Guid, StoreInformation)> = Vec::new();
    let mut addr = catalog_offset;

    while addr != 0 {
        check_abort(abort, LOC)?;
        observer.on_event(Event::CatalogBlock { offset: addr });

        let mut block = vec![0u8; BLOCK_SIZE as usize];
        read_exact_at(reader, addr, &mut block, LOC)?;

        let header = decode_catalog_block_header(&block, addr, region_base)?;

        'entries: for i in 0..CATALOG_ENTRIES_PER_BLOCK {
            let start = CATALOG_ENTRY_SIZE + i * CATALOG_ENTRY_SIZE;
            let entry = decode_catalog_entry(&block[start..start + CATALOG_ENTRY_SIZE])?;
            match entry {
                CatalogEntry::Terminator => break 'entries,
                CatalogEntry::Empty => continue,
                CatalogEntry::StoreInfo(info) => {
                    if let Some(slot) = pending.iter_mut().find(|(id, _)| *id == info.store_id) {
                        slot.1 = info;
                    } else {
                        pending.push((info.store_id, info));
                    }
                }
                CatalogEntry::StoreDescriptor(descriptor) => {
                    let info = pending
                        .iter()
                        .find(|(id, _)| *id == descriptor.store_id)
                        .map(|(_, info)| *info)
                        .ok_or_else(|| VssError::input(LOC, InputErrorKind::InvalidDescriptor))?;
                    records.push(CatalogRecord { info, descriptor });
                }
            }
        }

        addr = header.next_offset;
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::LogObserver;
    use crate::reader::FileByteReader;
    use crate::structures::{RecordType, VSS_SIGNATURE};
    use std::io::Cursor;

    fn empty_catalog_block(region_base: u64, self_offset: u64, next_offset: u64) -> Vec<u8> {
        let mut block = vec![0u8; BLOCK_SIZE as usize];
        block[0..16].copy_from_slice(&VSS_SIGNATURE);
        block[16..20].copy_from_slice(&(RecordType::Catalog as u32).to_le_bytes());
        let index = (self_offset - region_base) / BLOCK_SIZE;
        block[20..24].copy_from_slice(&(index as u32).to_le_bytes());
        block[24..32].copy_from_slice(&next_offset.to_le_bytes());
        block
    }

    #[test]
    fn pairs_store_info_with_descriptor() {
        let region_base = 0;
        let self_offset = BLOCK_SIZE;
        let mut block = empty_catalog_block(region_base, self_offset, 0);

        let guid_bytes = [9u8; 16];
        let info_start = CATALOG_ENTRY_SIZE;
        block[info_start] = 0x02;
        block[info_start + 8..info_start + 24].copy_from_slice(&guid_bytes);
        block[info_start + 32..info_start + 40].copy_from_slice(&7u64.to_le_bytes());

        let desc_start = CATALOG_ENTRY_SIZE * 2;
        block[desc_start] = 0x03;
        block[desc_start + 8..desc_start + 24].copy_from_slice(&guid_bytes);
        block[desc_start + 24..desc_start + 32].copy_from_slice(&0x5000u64.to_le_bytes());

        let reader = FileByteReader::from_handle(Cursor::new(block));
        let abort = AtomicBool::new(false);
        let records =
            scan_catalog(&reader, region_base, self_offset, &LogObserver, &abort).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].info.sequence_number, 7);
        assert_eq!(records[0].descriptor.store_header_offset, 0x5000);
    }

    #[test]
    fn descriptor_without_prior_info_is_an_error() {
        let region_base = 0;
        let self_offset = BLOCK_SIZE;
        let mut block = empty_catalog_block(region_base, self_offset, 0);
        let desc_start = CATALOG_ENTRY_SIZE;
        block[desc_start] = 0x03;

        let reader = FileByteReader::from_handle(Cursor::new(block));
        let abort = AtomicBool::new(false);
        assert!(scan_catalog(&reader, region_base, self_offset, &LogObserver, &abort).is_err());
    }
}
