//! `query-file-info` (SPEC_FULL.md §3, supplemented: named in spec.md
//! §6's command list and exercised by §8 P1, but never given a
//! handler of its own in §4).
//!
//! Deviates from routing every filesystem syscall through the DIO
//! dispatcher: this is a read-only stat/header-peek with no streaming
//! state, so it runs directly on the calling task rather than round-
//! tripping through a worker thread. See `DESIGN.md`.

use crate::error::Result;

use super::ServerState;

#[derive(Debug, Clone, Copy)]
pub struct FileInfo {
    pub file_size: u64,
    pub crc32: u32,
    pub create_timestamp: u32,
    pub source_ip: u32,
}

pub async fn handle(state: &ServerState, filename: &str) -> Result<FileInfo> {
    let resolved = super::resolve_filename(&state.registry, filename)?;

    match resolved.decoded.trunk {
        Some(trunk) => {
            let allocator = state
                .allocator_for(resolved.store_path.index)
                .ok_or_else(|| crate::error::StorageError::InvalidArgument("trunk storage not enabled".into()))?;
            let container = allocator.open_container(trunk.trunk_file_id)?;
            let header = crate::trunk::header::read_header(&container, trunk.slot_offset as u64)?;
            Ok(FileInfo {
                file_size: header.file_size as u64,
                crc32: header.crc32,
                create_timestamp: header.mtime,
                source_ip: resolved.decoded.fields.source_ip,
            })
        }
        None => {
            let meta = std::fs::metadata(&resolved.content_path)?;
            Ok(FileInfo {
                file_size: meta.len(),
                crc32: resolved.decoded.fields.crc32,
                create_timestamp: resolved.decoded.fields.timestamp,
                source_ip: resolved.decoded.fields.source_ip,
            })
        }
    }
}
