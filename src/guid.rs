//! GUID and FILETIME helpers.
//!
//! VSS store and catalog-entry identifiers are stored on disk as raw
//! Microsoft-form GUIDs: the first three fields little-endian, the last
//! eight bytes big-endian/verbatim. [`uuid::Uuid::from_fields`] expects
//! exactly that layout, so we build on it rather than hand-rolling byte
//! swaps, matching the rest of the `moses` codebase's use of the `uuid`
//! crate for on-disk identifiers.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A GUID as it appears in VSS on-disk structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid(Uuid);

impl Guid {
    /// Decode a GUID from its 16-byte on-disk representation.
    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        let data1 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let data2 = u16::from_le_bytes([bytes[4], bytes[5]]);
        let data3 = u16::from_le_bytes([bytes[6], bytes[7]]);
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&bytes[8..16]);
        Guid(Uuid::from_fields(data1, data2, data3, &data4))
    }

    /// The verbatim 16-byte on-disk representation.
    pub fn to_bytes(self) -> [u8; 16] {
        let (d1, d2, d3, d4) = self.0.as_fields();
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&d1.to_le_bytes());
        out[4..6].copy_from_slice(&d2.to_le_bytes());
        out[6..8].copy_from_slice(&d3.to_le_bytes());
        out[8..16].copy_from_slice(d4);
        out
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.hyphenated())
    }
}

/// A raw 64-bit FILETIME: 100-ns intervals since 1601-01-01 UTC.
pub type FileTime = u64;

const FILETIME_EPOCH_DIFF_100NS: i64 = 116_444_736_000_000_000;

/// Convert a FILETIME to a UTC timestamp, for logging/Debug output only.
/// Never used in resolution or ordering logic (stores are ordered by their
/// on-disk sequence number, not by this derived timestamp).
pub fn filetime_to_datetime(filetime: FileTime) -> Option<DateTime<Utc>> {
    let since_unix_100ns = filetime as i64 - FILETIME_EPOCH_DIFF_100NS;
    let secs = since_unix_100ns.div_euclid(10_000_000);
    let nanos = since_unix_100ns.rem_euclid(10_000_000) * 100;
    DateTime::from_timestamp(secs, nanos as u32)
}
