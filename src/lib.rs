//! Read-only access to Windows NT Volume Shadow Snapshots (VSS).
//!
//! Given a raw image of an NTFS volume, [`Volume::open`] parses the VSS
//! catalog and exposes each snapshot as a [`Store`]: a virtual block
//! device whose `read_at` returns the bytes that existed on the volume at
//! the moment the snapshot was taken, reconstructed by walking the VSS
//! block lists, bitmaps and forwarding chains.
//!
//! This crate never mutates the backing image, never interprets NTFS
//! filesystem contents beyond the two boot-sector fields it needs to size
//! the volume, and never decrypts, decompresses or authenticates data.
//!
//! ```no_run
//! use ntvss::{FileByteReader, Volume};
//!
//! # fn main() -> ntvss::error::Result<()> {
//! let reader = FileByteReader::open("ntfs.img")?;
//! let volume = Volume::open(reader, 0)?;
//! for i in 0..volume.store_count() {
//!     let store = volume.store(i)?;
//!     let mut buf = [0u8; 512];
//!     store.read_at(0, &mut buf)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod bitmap;
pub mod bootsector;
pub mod catalog;
pub mod error;
pub mod guid;
pub mod metadata;
pub mod observer;
pub mod reader;
pub mod resolver;
pub mod structures;
pub mod tree;
mod volume;

pub use bootsector::BootSectorInfo;
pub use error::{ArgumentErrorKind, InputErrorKind, RuntimeErrorKind, VssError};
pub use guid::{filetime_to_datetime, FileTime, Guid};
pub use observer::{Event, LogObserver, Observer};
pub use reader::{ByteReader, FileByteReader};
pub use volume::{check_volume_signature, Store, Volume, Whence};
