//! Trunk allocator (spec.md §4.C): serves slot requests for small-file
//! uploads when trunk storage is enabled.
//!
//! One allocator per store path, since disk writes within a path are
//! serialized (spec.md §5); state is held behind a single mutex, which
//! matches "the trunk allocator holds a per-path mutex around
//! alloc/free/confirm; no cross-path coordination."

use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use super::binlog::{Binlog, Record};
use super::header::{self, SlotHeader, HEADER_SIZE};
use super::TrunkInfo;
use crate::error::{Result, StorageError};

/// `(size, file_id, offset)`, ordered so the smallest-size entry with
/// the lowest file_id/offset sorts first -- a `BTreeMap` best-fit
/// lookup with stable tie-breaking, replacing the source's hand-rolled
/// AVL tree (spec.md §4.C).
type SizeKey = (u32, u32, u32);

struct State {
    free_by_size: BTreeMap<SizeKey, ()>,
    /// `(file_id, offset) -> size`, used to find adjacent neighbours
    /// for coalescing on free.
    free_by_location: BTreeMap<(u32, u32), u32>,
    next_file_id: u32,
    binlog: Binlog,
}

impl State {
    fn insert_free(&mut self, file_id: u32, offset: u32, size: u32) {
        self.free_by_size.insert((size, file_id, offset), ());
        self.free_by_location.insert((file_id, offset), size);
    }

    fn remove_free(&mut self, file_id: u32, offset: u32, size: u32) {
        self.free_by_size.remove(&(size, file_id, offset));
        self.free_by_location.remove(&(file_id, offset));
    }

    /// Coalesces `(file_id, offset, size)` with an immediately
    /// adjacent free neighbour on either side within the same
    /// container, then inserts the (possibly merged) slot.
    fn insert_free_coalescing(&mut self, file_id: u32, offset: u32, size: u32) {
        let mut offset = offset;
        let mut size = size;

        if let Some(&prev_size) = self.find_preceding(file_id, offset) {
            let prev_offset = offset - prev_size;
            self.remove_free(file_id, prev_offset, prev_size);
            offset = prev_offset;
            size += prev_size;
        }

        if let Some(&next_size) = self.free_by_location.get(&(file_id, offset + size)) {
            self.remove_free(file_id, offset + size, next_size);
            size += next_size;
        }

        self.insert_free(file_id, offset, size);
    }

    /// Finds a free slot in `file_id` whose `offset + size == at`, if
    /// any -- the slot immediately preceding `at`.
    fn find_preceding(&self, file_id: u32, at: u32) -> Option<&u32> {
        self.free_by_location
            .range((file_id, 0)..(file_id, at))
            .rev()
            .find(|(&(fid, off), &sz)| fid == file_id && off + sz == at)
            .map(|(_, sz)| sz)
    }
}

/// Per-path trunk allocator.
pub struct TrunkAllocator {
    data_root: PathBuf,
    subdir_count: u16,
    trunk_file_size: u64,
    min_slot_size: u32,
    state: Mutex<State>,
}

impl TrunkAllocator {
    /// Opens (or creates) the allocator for one store path, replaying
    /// its binlog and reconciling against on-disk trunk headers per
    /// spec.md §4.C "Failure semantics".
    pub fn open(
        data_root: PathBuf,
        subdir_count: u16,
        trunk_file_size: u64,
        min_slot_size: u32,
    ) -> Result<Self> {
        let binlog_path = data_root.join(".trunk_binlog");
        let mut state = State {
            free_by_size: BTreeMap::new(),
            free_by_location: BTreeMap::new(),
            next_file_id: 1,
            binlog: Binlog::open(&binlog_path)?,
        };

        let mut max_file_id = 0;
        for record in Binlog::replay(&binlog_path)? {
            match record {
                Record::Free { file_id, offset, size } => {
                    state.insert_free_coalescing(file_id, offset, size);
                    max_file_id = max_file_id.max(file_id);
                }
                Record::Alloc { file_id, offset, size } => {
                    state.remove_free(file_id, offset, size);
                    max_file_id = max_file_id.max(file_id);
                }
            }
        }
        state.next_file_id = max_file_id + 1;

        let allocator = Self {
            data_root,
            subdir_count,
            trunk_file_size,
            min_slot_size,
            state: Mutex::new(state),
        };

        for file_id in 1..=max_file_id {
            allocator.reconcile_container(file_id)?;
        }

        Ok(allocator)
    }

    /// Deterministic container path for a trunk file ID: same
    /// two-level hash the path registry uses for normal files, so
    /// containers share the fan-out tree instead of needing separate
    /// bookkeeping of where each one lives (spec.md §3 "Store path":
    /// subdirectories "hold either normal files or trunk containers").
    pub fn container_path(&self, file_id: u32) -> PathBuf {
        let k = self.subdir_count as u32;
        let xx = (file_id / k) % k;
        let yy = file_id % k;
        self.data_root.join(format!("{xx:02X}")).join(format!("{yy:02X}")).join(format!("trunk-{file_id:010}"))
    }

    /// Reconciles in-memory free-list state for one container against
    /// its on-disk headers: slots the binlog believes allocated but
    /// whose header is all-zero are a torn `alloc`-without-`confirm`
    /// and are reclaimed as free (spec.md §4.C).
    fn reconcile_container(&self, file_id: u32) -> Result<()> {
        let path = self.container_path(file_id);
        if !path.exists() {
            return Ok(());
        }
        let file = header::open_container(&path)?;
        let len = header::container_len(&file)?;

        let mut offset = 0u32;
        while (offset as u64) < len {
            let already_free = {
                let state = self.state.lock().unwrap();
                state.free_by_location.contains_key(&(file_id, offset))
            };
            let slot_header = header::read_header(&file, offset as u64)?;
            let alloc_size = if slot_header.alloc_size == 0 {
                // Never-written tail slot; treat the rest of the
                // container as one free slot and stop.
                (len as u32).saturating_sub(offset)
            } else {
                slot_header.alloc_size
            };

            if !already_free && slot_header.is_empty() {
                warn!(file_id, offset, alloc_size, "reclaiming torn trunk alloc as free slot");
                let mut state = self.state.lock().unwrap();
                state.binlog.append(Record::Free { file_id, offset, size: alloc_size })?;
                state.insert_free_coalescing(file_id, offset, alloc_size);
            }

            offset = offset.saturating_add(alloc_size.max(HEADER_SIZE));
        }
        Ok(())
    }

    /// Finds the smallest free slot `>= size + HEADER_SIZE`; if none
    /// fits, pre-allocates a new container and retries (spec.md §4.C
    /// `alloc`).
    pub fn alloc(&self, size: u32) -> Result<TrunkInfo> {
        let needed = size.checked_add(HEADER_SIZE).ok_or_else(|| {
            StorageError::InvalidArgument("requested trunk slot size overflows u32".into())
        })?;

        if let Some(info) = self.try_alloc(needed)? {
            return Ok(info);
        }

        self.create_container()?;
        self.try_alloc(needed)?.ok_or_else(|| {
            StorageError::Io(std::io::Error::other("trunk allocator: no slot after new container"))
        })
    }

    fn try_alloc(&self, needed: u32) -> Result<Option<TrunkInfo>> {
        let mut state = self.state.lock().unwrap();

        let found = state
            .free_by_size
            .range((needed, 0, 0)..)
            .next()
            .map(|(&key, _)| key);

        let Some((slot_size, file_id, offset)) = found else { return Ok(None) };
        state.remove_free(file_id, offset, slot_size);

        let leftover = slot_size - needed;
        let (assigned_size, remainder) = if leftover >= self.min_slot_size {
            (needed, Some((offset + needed, leftover)))
        } else {
            (slot_size, None)
        };

        state.binlog.append(Record::Alloc { file_id, offset, size: assigned_size })?;
        if let Some((rem_offset, rem_size)) = remainder {
            state.binlog.append(Record::Free { file_id, offset: rem_offset, size: rem_size })?;
            state.insert_free(file_id, rem_offset, rem_size);
        }

        Ok(Some(TrunkInfo { file_id, offset, size: assigned_size }))
    }

    fn create_container(&self) -> Result<()> {
        let file_id = {
            let mut state = self.state.lock().unwrap();
            let id = state.next_file_id;
            state.next_file_id += 1;
            id
        };

        let path = self.container_path(file_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        header::check_and_init(&path, self.trunk_file_size)?;

        let mut state = self.state.lock().unwrap();
        state.binlog.append(Record::Free { file_id, offset: 0, size: self.trunk_file_size as u32 })?;
        state.insert_free(file_id, 0, self.trunk_file_size as u32);
        info!(file_id, size = self.trunk_file_size, "trunk container created");
        Ok(())
    }

    /// Returns a slot to the free list, coalescing with adjacent
    /// neighbours, and zeroes its on-disk header (spec.md §4.C
    /// `free`). Called both for explicit deletes and for abort
    /// cleanup between `alloc` and `confirm`.
    pub fn free(&self, info: TrunkInfo) -> Result<()> {
        let path = self.container_path(info.file_id);
        let file = header::open_container(&path)?;
        header::clear_header(&file, info.offset as u64)?;

        let mut state = self.state.lock().unwrap();
        state.binlog.append(Record::Free { file_id: info.file_id, offset: info.offset, size: info.size })?;
        state.insert_free_coalescing(info.file_id, info.offset, info.size);
        Ok(())
    }

    /// Writes the final slot header once an upload into an allocated
    /// slot completes, transitioning the slot from transiently owned
    /// to durably occupied (spec.md §4.C `confirm`).
    pub fn confirm(
        &self,
        info: TrunkInfo,
        file_size: u32,
        crc32: u32,
        file_type: u8,
        ext: &str,
    ) -> Result<()> {
        let path = self.container_path(info.file_id);
        let file = header::open_container(&path)?;
        let mtime = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as u32;

        let header = SlotHeader {
            alloc_size: info.size,
            file_size,
            crc32,
            mtime,
            file_type,
            ext: SlotHeader::with_ext(ext),
        };
        header::write_header(&file, info.offset as u64, &header)?;
        Ok(())
    }

    /// Opens the container file a given slot lives in, positioned for
    /// DIO handlers to read/write the payload starting right after the
    /// header.
    pub fn open_container(&self, file_id: u32) -> Result<File> {
        header::open_container(&self.container_path(file_id))
    }
}

#[cfg(test)]
#[path = "tests/allocator.rs"]
mod tests;
