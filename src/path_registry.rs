//! Path registry (spec.md §4.A).
//!
//! Enumerates configured store paths, maintains each path's two-level
//! `XX/YY` subdirectory fan-out, and reserves space for writes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::config::{StorageConfig, StoreLookup};
use crate::error::{Result, StorageError};

/// One configured store path and its cached free-space counter.
pub struct StorePath {
    pub index: usize,
    pub root: PathBuf,
    pub data_root: PathBuf,
    pub logs_root: PathBuf,
    subdir_count: u16,
    /// Updated on upload success and periodically refreshed; readers
    /// use relaxed ordering (spec.md §5 "Shared resources").
    free_bytes: AtomicU64,
    reserved: u64,
}

impl StorePath {
    /// Two-level hex subdirectory for a given hash value, each
    /// component in `00..subdir_count-1`.
    pub fn subdir_for(&self, hash: u32) -> (u16, u16) {
        let k = self.subdir_count as u32;
        let xx = (hash / k) % k;
        let yy = hash % k;
        (xx as u16, yy as u16)
    }

    pub fn subdir_path(&self, xx: u16, yy: u16) -> PathBuf {
        self.data_root.join(format!("{xx:02X}")).join(format!("{yy:02X}"))
    }

    pub fn subdir_count(&self) -> u16 {
        self.subdir_count
    }

    pub fn free_bytes(&self) -> u64 {
        self.free_bytes.load(Ordering::Relaxed)
    }

    pub fn reserved(&self) -> u64 {
        self.reserved
    }

    /// Whether this path currently has room for a request of `size`
    /// bytes (spec.md §8 P8).
    pub fn has_room_for(&self, size: u64) -> bool {
        self.free_bytes() >= size.saturating_add(self.reserved)
    }

    /// Debits `size` bytes from the cached free-space counter after a
    /// successful upload, ahead of the next periodic refresh.
    pub fn debit(&self, size: u64) {
        self.free_bytes.fetch_sub(size.min(self.free_bytes()), Ordering::Relaxed);
    }

    /// Credits `size` bytes back after a delete.
    pub fn credit(&self, size: u64) {
        self.free_bytes.fetch_add(size, Ordering::Relaxed);
    }

    /// Re-reads free space straight from the filesystem
    /// (`statvfs`-equivalent), per spec.md §5 "periodically
    /// refreshed".
    pub fn refresh_free_bytes(&self) -> Result<()> {
        let bytes = query_free_bytes(&self.root)?;
        self.free_bytes.store(bytes, Ordering::Relaxed);
        Ok(())
    }
}

fn query_free_bytes(path: &Path) -> Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| StorageError::InvalidArgument("store path contains NUL byte".into()))?;

    // SAFETY: `statvfs` writes into a fully-owned, zero-initialized
    // struct; `cpath` is a valid NUL-terminated C string for the
    // duration of the call.
    unsafe {
        let mut stat: libc::statvfs = std::mem::zeroed();
        let rc = libc::statvfs(cpath.as_ptr(), &mut stat);
        if rc != 0 {
            return Err(StorageError::Io(std::io::Error::last_os_error()));
        }
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    }
}

/// Enumerates configured store paths and their subdirectory trees.
pub struct PathRegistry {
    paths: Vec<StorePath>,
    lookup: StoreLookup,
    next_round_robin: AtomicU64,
}

impl PathRegistry {
    /// Builds the registry, creating `data/XX/YY` and `logs/` under
    /// each configured path (spec.md §4.A, "created on first start").
    /// A configured path that cannot be created is fatal, per spec.md
    /// §4.A's failure modes.
    pub fn init(config: &StorageConfig) -> Result<Self> {
        let mut paths = Vec::with_capacity(config.store_paths.len());
        for (index, root) in config.store_paths.iter().enumerate() {
            let data_root = root.join("data");
            let logs_root = root.join("logs");
            std::fs::create_dir_all(&logs_root)?;

            for xx in 0..config.subdir_count_per_path {
                for yy in 0..config.subdir_count_per_path {
                    let dir = data_root.join(format!("{xx:02X}")).join(format!("{yy:02X}"));
                    std::fs::create_dir_all(&dir)?;
                }
            }

            let free_bytes = query_free_bytes(root).unwrap_or(0);
            info!(path = %root.display(), index, free_bytes, "store path initialized");

            paths.push(StorePath {
                index,
                root: root.clone(),
                data_root,
                logs_root,
                subdir_count: config.subdir_count_per_path,
                free_bytes: AtomicU64::new(free_bytes),
                reserved: config.reserved_storage_space,
            });
        }

        Ok(Self { paths, lookup: config.store_lookup, next_round_robin: AtomicU64::new(0) })
    }

    pub fn path(&self, index: usize) -> &StorePath {
        &self.paths[index]
    }

    pub fn count(&self) -> usize {
        self.paths.len()
    }

    pub fn paths(&self) -> &[StorePath] {
        &self.paths
    }

    /// Selects a store path with room for `size` bytes, per the
    /// configured [`StoreLookup`] policy. Spec.md §4.A: "the returned
    /// path has free >= size + reserved."
    pub fn acquire_path(&self, size: u64) -> Result<&StorePath> {
        match self.lookup {
            StoreLookup::RoundRobin | StoreLookup::SpecifiedGroup => self.round_robin(size),
            StoreLookup::LoadBalance => self.most_free(size),
        }
    }

    fn round_robin(&self, size: u64) -> Result<&StorePath> {
        let n = self.paths.len() as u64;
        for _ in 0..n {
            let i = (self.next_round_robin.fetch_add(1, Ordering::Relaxed) % n) as usize;
            if self.paths[i].has_room_for(size) {
                return Ok(&self.paths[i]);
            }
        }
        Err(StorageError::NoSpace)
    }

    fn most_free(&self, size: u64) -> Result<&StorePath> {
        self.paths
            .iter()
            .filter(|p| p.has_room_for(size))
            .max_by_key(|p| p.free_bytes())
            .ok_or(StorageError::NoSpace)
    }

    pub fn refresh_all(&self) {
        for path in &self.paths {
            if let Err(err) = path.refresh_free_bytes() {
                tracing::warn!(path = %path.root.display(), %err, "failed to refresh free space");
            }
        }
    }
}

#[cfg(test)]
#[path = "path_registry/tests.rs"]
mod tests;
