//! Storage-core configuration.
//!
//! Parsing the on-disk `storage.conf` file, daemonizing, and wiring this
//! struct to a CLI are left to the embedding binary (out of scope here,
//! see `SPEC_FULL.md` §4). This module only owns the in-memory shape and
//! its validation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// Strategy used by the path registry to pick a store path for a new
/// upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreLookup {
    RoundRobin,
    SpecifiedGroup,
    LoadBalance,
}

/// Which content-hash scheme is computed alongside CRC32 for
/// de-duplication fingerprinting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSignatureMethod {
    /// Four 32-bit rolling hashes, FastDFS's original "hash" mode.
    Hash,
    /// A single MD5-128 digest.
    Md5,
}

/// Full configuration surface the disk-I/O core consumes, per
/// spec.md §6 "Config inputs the core consumes".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Configured store paths, index 0..N-1 is significant (it is
    /// embedded in file IDs and trunk binlog records).
    pub store_paths: Vec<PathBuf>,
    /// Two-level fan-out width per path (`K`): subdirectories are
    /// `00..K-1` in hex on each level.
    pub subdir_count_per_path: u16,
    /// Reader threads per store path.
    pub disk_reader_threads: usize,
    /// Writer threads per store path.
    pub disk_writer_threads: usize,
    /// When false, reader and writer threads are merged into one pool
    /// of `disk_reader_threads + disk_writer_threads` per path.
    pub disk_rw_separated: bool,
    /// Minimum free bytes a path must retain; uploads are refused once
    /// `free_bytes < request_size + reserved_storage_space`.
    pub reserved_storage_space: u64,
    /// Whether small-file uploads are packed into trunk containers.
    pub trunk_enabled: bool,
    /// Size of newly pre-allocated trunk container files.
    pub trunk_file_size: u64,
    /// Minimum leftover size a split trunk slot must have to be
    /// re-inserted into the free list rather than given away whole.
    pub trunk_min_slot_size: u32,
    /// Content-hash scheme used for the optional 16-byte fingerprint.
    pub file_signature_method: FileSignatureMethod,
    /// Path-selection policy for new uploads.
    pub store_lookup: StoreLookup,
}

impl StorageConfig {
    /// Validates cross-field invariants the rest of the core assumes
    /// hold (spec.md §4.A "configured path missing -> fatal at
    /// startup" and friends).
    pub fn validate(&self) -> Result<()> {
        if self.store_paths.is_empty() {
            return Err(StorageError::InvalidArgument("store_paths must not be empty".into()));
        }
        if self.subdir_count_per_path == 0 || self.subdir_count_per_path > 256 {
            return Err(StorageError::InvalidArgument(
                "subdir_count_per_path must be in 1..=256".into(),
            ));
        }
        if self.disk_reader_threads == 0 || self.disk_writer_threads == 0 {
            return Err(StorageError::InvalidArgument(
                "disk_reader_threads and disk_writer_threads must be >= 1".into(),
            ));
        }
        if self.trunk_enabled && self.trunk_file_size < self.trunk_min_slot_size as u64 {
            return Err(StorageError::InvalidArgument(
                "trunk_file_size must be >= trunk_min_slot_size".into(),
            ));
        }
        for path in &self.store_paths {
            if !path.is_absolute() {
                return Err(StorageError::InvalidArgument(format!(
                    "store path {} must be absolute",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Number of worker threads the DIO dispatcher spawns for a given
    /// store path (spec.md §4.F).
    pub fn threads_per_path(&self) -> (usize, usize) {
        if self.disk_rw_separated {
            (self.disk_reader_threads, self.disk_writer_threads)
        } else {
            let combined = self.disk_reader_threads + self.disk_writer_threads;
            (combined, combined)
        }
    }
}

#[cfg(test)]
#[path = "config/tests.rs"]
mod tests;
