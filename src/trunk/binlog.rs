//! Persistent alloc/free log for the trunk allocator (spec.md §4.C).
//!
//! Every `alloc` and `free` is appended before the in-memory free list
//! is updated, so a restart can rebuild allocator state without
//! re-scanning every container (the allocator still reconciles
//! against on-disk headers afterwards, since a crash between an
//! `alloc` binlog append and the matching `confirm` leaves a slot
//! that looks allocated here but is actually still free on disk).

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::Path;

use crate::error::Result;

const RECORD_LEN: usize = 13;
const OP_ALLOC: u8 = 1;
const OP_FREE: u8 = 2;

/// One binlog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Alloc { file_id: u32, offset: u32, size: u32 },
    Free { file_id: u32, offset: u32, size: u32 },
}

impl Record {
    fn pack(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        let (op, file_id, offset, size) = match *self {
            Record::Alloc { file_id, offset, size } => (OP_ALLOC, file_id, offset, size),
            Record::Free { file_id, offset, size } => (OP_FREE, file_id, offset, size),
        };
        buf[0] = op;
        buf[1..5].copy_from_slice(&file_id.to_le_bytes());
        buf[5..9].copy_from_slice(&offset.to_le_bytes());
        buf[9..13].copy_from_slice(&size.to_le_bytes());
        buf
    }

    fn unpack(buf: &[u8; RECORD_LEN]) -> Option<Self> {
        let file_id = u32::from_le_bytes(buf[1..5].try_into().unwrap());
        let offset = u32::from_le_bytes(buf[5..9].try_into().unwrap());
        let size = u32::from_le_bytes(buf[9..13].try_into().unwrap());
        match buf[0] {
            OP_ALLOC => Some(Record::Alloc { file_id, offset, size }),
            OP_FREE => Some(Record::Free { file_id, offset, size }),
            _ => None,
        }
    }
}

/// Append-only writer for the per-path trunk binlog.
pub struct Binlog {
    file: File,
}

impl Binlog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).read(true).open(path)?;
        Ok(Self { file })
    }

    /// Appends a record and flushes it before returning, so a
    /// subsequent crash cannot lose it (spec.md §4.C: the binlog is
    /// the durability anchor for allocator state).
    pub fn append(&mut self, record: Record) -> Result<()> {
        self.file.write_all(&record.pack())?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Replays every well-formed record in file order. Trailing
    /// partial records (a crash mid-append) are ignored rather than
    /// treated as corruption, matching the binlog's append-only,
    /// best-effort-durable nature.
    pub fn replay(path: &Path) -> Result<Vec<Record>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new().read(true).open(path)?;
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut buf = [0u8; RECORD_LEN];
        loop {
            match reader.read_exact(&mut buf) {
                Ok(()) => {
                    if let Some(record) = Record::unpack(&buf) {
                        records.push(record);
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_alloc_and_free_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binlog");
        {
            let mut log = Binlog::open(&path).unwrap();
            log.append(Record::Free { file_id: 1, offset: 0, size: 65536 }).unwrap();
            log.append(Record::Alloc { file_id: 1, offset: 0, size: 256 }).unwrap();
            log.append(Record::Free { file_id: 1, offset: 256, size: 65280 }).unwrap();
        }

        let records = Binlog::replay(&path).unwrap();
        assert_eq!(
            records,
            vec![
                Record::Free { file_id: 1, offset: 0, size: 65536 },
                Record::Alloc { file_id: 1, offset: 0, size: 256 },
                Record::Free { file_id: 1, offset: 256, size: 65280 },
            ]
        );
    }

    #[test]
    fn replay_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-binlog");
        assert_eq!(Binlog::replay(&path).unwrap(), Vec::new());
    }

    #[test]
    fn replay_ignores_trailing_partial_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binlog");
        {
            let mut log = Binlog::open(&path).unwrap();
            log.append(Record::Free { file_id: 2, offset: 0, size: 1024 }).unwrap();
        }
        // Simulate a crash mid-append.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[9, 9, 9]).unwrap();

        let records = Binlog::replay(&path).unwrap();
        assert_eq!(records, vec![Record::Free { file_id: 2, offset: 0, size: 1024 }]);
    }
}
