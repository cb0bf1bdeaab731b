//! Minimal NTFS boot-sector reader.
//!
//! This does not parse the NTFS filesystem. It reads exactly the two
//! fields `libvshadow`'s own `libvshadow_ntfs_volume_header` collaborator
//! needs (`original_source/libvshadow/libvshadow_ntfs_volume_header.h`):
//! `bytes_per_sector` and the volume's total size. [`crate::Volume::open`]
//! takes only a reader and a `volume_offset`, so it has to recover these
//! two values itself rather than have a caller supply them separately.

use crate::error::{InputErrorKind, Result, VssError};
use crate::reader::{read_exact_at, ByteReader};

const BOOT_SECTOR_SIZE: usize = 512;
const BYTES_PER_SECTOR_OFFSET: usize = 0x0b;
const SECTORS_IN_VOLUME_OFFSET: usize = 0x28;
const NTFS_OEM_ID: &[u8; 8] = b"NTFS    ";
const OEM_ID_OFFSET: usize = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSectorInfo {
    pub bytes_per_sector: u16,
    pub volume_size: u64,
}

/// Read the BPB fields needed to size the volume, at `volume_offset` in
/// `reader` (the NTFS boot sector sits at the start of the partition, the
/// same base the VSS volume header's `+0x1e00` offset is relative to).
pub fn read_boot_sector(reader: &dyn ByteReader, volume_offset: u64) -> Result<BootSectorInfo> {
    let mut data = [0u8; BOOT_SECTOR_SIZE];
    read_exact_at(reader, volume_offset, &mut data, "bootsector::read_boot_sector")?;

    if &data[OEM_ID_OFFSET..OEM_ID_OFFSET + 8] != NTFS_OEM_ID {
        return Err(VssError::input(
            "bootsector::read_boot_sector",
            InputErrorKind::SignatureMismatch,
        ));
    }

    let bytes_per_sector = u16::from_le_bytes([
        data[BYTES_PER_SECTOR_OFFSET],
        data[BYTES_PER_SECTOR_OFFSET + 1],
    ]);
    let sectors_in_volume = u64::from_le_bytes(
        data[SECTORS_IN_VOLUME_OFFSET..SECTORS_IN_VOLUME_OFFSET + 8]
            .try_into()
            .expect("8-byte slice"),
    );

    if bytes_per_sector == 0 {
        return Err(VssError::input(
            "bootsector::read_boot_sector",
            InputErrorKind::InvalidDescriptor,
        ));
    }

    Ok(BootSectorInfo {
        bytes_per_sector,
        volume_size: sectors_in_volume * bytes_per_sector as u64,
    })
}
