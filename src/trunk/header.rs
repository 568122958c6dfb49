//! Trunk-file codec (spec.md §4.D / §6 "Trunk slot header").
//!
//! Reads and writes the 24-byte packed header prefixing every slot in
//! a trunk container, and validates slot occupancy before an upload
//! is allowed to write into a slot the allocator believes free.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;

use tracing::warn;

use crate::error::{Result, StorageError};

/// Width of the packed header, per spec.md §3/§6.
pub const HEADER_SIZE: u32 = 24;
/// Width of the ASCII, NUL-padded extension field.
pub const EXT_FIELD_LEN: usize = 6;

/// File-type bitset stored in a slot header (spec.md §6).
pub mod file_type {
    pub const REGULAR: u8 = 1;
    pub const LINK: u8 = 2;
    pub const APPENDER: u8 = 4;
}

/// In-memory view of a slot header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHeader {
    /// Total slot size including this header.
    pub alloc_size: u32,
    /// Payload bytes actually used.
    pub file_size: u32,
    pub crc32: u32,
    /// UNIX seconds.
    pub mtime: u32,
    pub file_type: u8,
    /// ASCII, NUL-padded to [`EXT_FIELD_LEN`].
    pub ext: [u8; EXT_FIELD_LEN],
}

impl SlotHeader {
    /// An all-zero header, the on-disk representation of a free slot.
    pub const EMPTY: SlotHeader =
        SlotHeader { alloc_size: 0, file_size: 0, crc32: 0, mtime: 0, file_type: 0, ext: [0; EXT_FIELD_LEN] };

    pub fn with_ext(ext: &str) -> [u8; EXT_FIELD_LEN] {
        let mut out = [0u8; EXT_FIELD_LEN];
        let bytes = ext.as_bytes();
        let n = bytes.len().min(EXT_FIELD_LEN);
        out[..n].copy_from_slice(&bytes[..n]);
        out
    }

    pub fn ext_str(&self) -> String {
        let end = self.ext.iter().position(|&b| b == 0).unwrap_or(EXT_FIELD_LEN);
        String::from_utf8_lossy(&self.ext[..end]).into_owned()
    }

    /// Packs the header into its 24-byte little-endian wire form.
    pub fn pack(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&self.alloc_size.to_le_bytes());
        buf[4..8].copy_from_slice(&self.file_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.crc32.to_le_bytes());
        buf[12..16].copy_from_slice(&self.mtime.to_le_bytes());
        buf[16] = self.file_type;
        buf[17..17 + EXT_FIELD_LEN].copy_from_slice(&self.ext);
        // buf[23] (reserved) stays zero.
        buf
    }

    /// Unpacks a 24-byte buffer read from disk.
    pub fn unpack(buf: &[u8; HEADER_SIZE as usize]) -> Self {
        let mut ext = [0u8; EXT_FIELD_LEN];
        ext.copy_from_slice(&buf[17..17 + EXT_FIELD_LEN]);
        Self {
            alloc_size: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            file_size: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            crc32: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            mtime: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            file_type: buf[16],
            ext,
        }
    }

    /// True iff every field is zero, i.e. this is a free slot.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Implements the "tolerant zero" heuristic from spec.md §9: the
    /// header is treated as representing a free slot if it matches
    /// all-zero once `alloc_size`, `file_size` and `file_type` are
    /// re-zeroed. This is replicated literally from the source
    /// behavior; its exact intent is unclear, so a match on a header
    /// that was not already fully zero is logged.
    pub fn looks_free_when_tolerant(&self) -> bool {
        let tolerant = Self { alloc_size: 0, file_size: 0, file_type: 0, ..*self };
        let matches = tolerant.is_empty();
        if matches && !self.is_empty() {
            warn!(
                alloc_size = self.alloc_size,
                file_size = self.file_size,
                file_type = self.file_type,
                "trunk header matched tolerant-zero heuristic with non-zero tolerated fields"
            );
        }
        matches
    }
}

/// Creates a new container file of `size` bytes, zero-filled, or
/// sanity-checks an existing one's length (spec.md §4.D
/// `check_and_init`).
pub fn check_and_init(container_path: &Path, size: u64) -> Result<File> {
    let exists = container_path.exists();
    let file = OpenOptions::new().read(true).write(true).create(true).open(container_path)?;

    if exists {
        let actual_len = file.metadata()?.len();
        if actual_len != size {
            return Err(StorageError::InvalidArgument(format!(
                "trunk container {} has length {actual_len}, expected {size}",
                container_path.display()
            )));
        }
    } else {
        file.set_len(size)?;
        file.sync_all()?;
    }
    Ok(file)
}

/// Reads the 24 bytes at `slot_offset` and checks whether the slot is
/// free, per spec.md §4.D `check_slot_free`. Returns
/// [`StorageError::SlotOccupied`] if not, refusing the upload to
/// protect existing data (spec.md §8 P4).
pub fn check_slot_free(file: &File, slot_offset: u64) -> Result<()> {
    let header = read_header(file, slot_offset)?;
    if header.is_empty() || header.looks_free_when_tolerant() {
        Ok(())
    } else {
        Err(StorageError::SlotOccupied)
    }
}

/// Reads and unpacks the header at `slot_offset`.
pub fn read_header(file: &File, slot_offset: u64) -> Result<SlotHeader> {
    let mut buf = [0u8; HEADER_SIZE as usize];
    file.read_exact_at(&mut buf, slot_offset)?;
    Ok(SlotHeader::unpack(&buf))
}

/// Packs and writes `header` at `slot_offset`.
pub fn write_header(file: &File, slot_offset: u64, header: &SlotHeader) -> Result<()> {
    file.write_all_at(&header.pack(), slot_offset)?;
    Ok(())
}

/// Zeroes the header at `slot_offset`, marking the slot free on disk.
pub fn clear_header(file: &File, slot_offset: u64) -> Result<()> {
    file.write_all_at(&SlotHeader::EMPTY.pack(), slot_offset)?;
    Ok(())
}

/// Opens a container file read/write without the create-or-check
/// behavior of [`check_and_init`], for ordinary slot access.
pub fn open_container(container_path: &Path) -> Result<File> {
    Ok(OpenOptions::new().read(true).write(true).open(container_path)?)
}

/// Reads the whole container length, used by `confirm`/tests.
pub fn container_len(file: &File) -> Result<u64> {
    Ok(file.metadata()?.len())
}

#[cfg(test)]
#[path = "tests/header.rs"]
mod tests;
