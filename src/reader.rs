//! Positioned-read abstraction over the backing image.
//!
//! Every other component addresses the image by *absolute offset*; this is
//! the only place that knows about the underlying file handle. A single
//! `volume_offset`, fixed at construction, is added before every read so
//! that a VSS region embedded in a partitioned disk image can be read by
//! pointing at the partition's start rather than byte 0 of the disk.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Mutex;

use crate::error::{Result, VssError};

/// A positioned-read source. Implementations must be safe to call from
/// multiple threads concurrently; [`FileByteReader`] does this with an
/// internal mutex around the single OS handle.
pub trait ByteReader: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes actually read. Fewer bytes than requested is only
    /// valid at end-of-source.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Total size of the backing source, in bytes.
    fn size(&self) -> Result<u64>;
}

/// A [`ByteReader`] backed by a `std::fs::File` (or any `Read + Seek`),
/// serializing positioned reads with a mutex since `Read`/`Seek` require
/// `&mut self`.
pub struct FileByteReader<F> {
    inner: Mutex<F>,
}

impl FileByteReader<File> {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let file = File::open(path).map_err(|e| VssError::io("FileByteReader::open", e))?;
        Ok(Self::from_handle(file))
    }
}

impl<F> FileByteReader<F> {
    pub fn from_handle(handle: F) -> Self {
        Self {
            inner: Mutex::new(handle),
        }
    }
}

impl<F: Read + Seek + Send> ByteReader for FileByteReader<F> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard
            .seek(SeekFrom::Start(offset))
            .map_err(|e| VssError::io("FileByteReader::read_at/seek", e))?;

        let mut total = 0;
        while total < buf.len() {
            match guard.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(VssError::io("FileByteReader::read_at/read", e)),
            }
        }
        Ok(total)
    }

    fn size(&self) -> Result<u64> {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let pos = guard
            .seek(SeekFrom::Current(0))
            .map_err(|e| VssError::io("FileByteReader::size/tell", e))?;
        let end = guard
            .seek(SeekFrom::End(0))
            .map_err(|e| VssError::io("FileByteReader::size/seek_end", e))?;
        guard
            .seek(SeekFrom::Start(pos))
            .map_err(|e| VssError::io("FileByteReader::size/restore", e))?;
        Ok(end)
    }
}

/// Reads exactly `buf.len()` bytes at `offset`, treating a short read as a
/// fatal I/O error — used everywhere a fixed-layout record is expected.
pub fn read_exact_at(reader: &dyn ByteReader, offset: u64, buf: &mut [u8], location: &'static str) -> Result<()> {
    let n = reader.read_at(offset, buf)?;
    if n != buf.len() {
        return Err(VssError::io(
            location,
            std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "short read at offset {:#x}: expected {} bytes, got {}",
                    offset,
                    buf.len(),
                    n
                ),
            ),
        ));
    }
    Ok(())
}
