//! Download (spec.md §4.G "Download", states `Parse-ID -> Open -> Read
//! -> Send -> [Read->Send]* -> Close -> Done").
//!
//! The network-task layer here buffers the whole response in memory
//! rather than streaming chunk-by-chunk to the socket as they arrive;
//! see `DESIGN.md` for why that simplification is in scope.

use std::os::unix::io::RawFd;

use tracing::{error, warn};

use crate::cleanup::DownloadCallbacks;
use crate::context::{FileContext, OpKind, OpenFlags};
use crate::dio::NextStage;
use crate::error::{Result, StorageError};

use super::ServerState;

pub struct DownloadResult {
    pub content: Vec<u8>,
}

pub async fn handle(
    state: &ServerState,
    socket_fd: RawFd,
    filename: &str,
    offset: u64,
    download_bytes: u64,
) -> Result<DownloadResult> {
    state.stats.total_read_count();

    let resolved = super::resolve_filename(&state.registry, filename)?;
    let file_size = resolved.decoded.fields.size;
    let end = if download_bytes == 0 { file_size } else { (offset + download_bytes).min(file_size) };
    if offset > file_size || end < offset {
        return Err(StorageError::InvalidArgument(format!(
            "download range {offset}..{end} outside file size {file_size}"
        )));
    }

    let target_path = match resolved.decoded.trunk {
        Some(trunk) => {
            let allocator = state
                .allocator_for(resolved.store_path.index)
                .ok_or_else(|| StorageError::InvalidArgument("trunk storage not enabled".into()))?;
            let container = allocator.open_container(trunk.trunk_file_id)?;
            let header = crate::trunk::header::read_header(&container, trunk.slot_offset as u64)?;
            if header.crc32 != resolved.decoded.fields.crc32 {
                let err = StorageError::CrcMismatch { expected: resolved.decoded.fields.crc32, computed: header.crc32 };
                error!(filename, %err, "trunk slot header crc32 does not match file id");
            }
            allocator.container_path(trunk.trunk_file_id)
        }
        None => resolved.content_path.clone(),
    };

    let mut ctx = Box::new(
        FileContext::new(OpKind::Read, target_path, OpenFlags::read_only())
            .with_range(offset, end)
            .with_crc32()
            .with_hooks(Box::new(DownloadCallbacks)),
    );
    if let Some(trunk) = resolved.decoded.trunk {
        ctx = Box::new((*ctx).with_trunk(trunk.into()));
    }

    let path_index = resolved.store_path.index;
    let mut content = Vec::with_capacity((end - offset) as usize);

    loop {
        let rx = state.dispatcher.submit_read(path_index, socket_fd as i32, ctx);
        let (returned_ctx, next) = rx.await.map_err(|_| StorageError::Aborted)?;
        ctx = returned_ctx;

        if let Some(buf) = ctx.pending_send_buf.take() {
            content.extend_from_slice(&buf);
        }

        match next {
            NextStage::Send => continue,
            NextStage::Done(Ok(())) => break,
            NextStage::Done(Err(err)) => return Err(err),
            NextStage::Recv => {
                return Err(StorageError::InvalidArgument("read handler asked to receive".into()))
            }
        }
    }

    if let Some(crc) = ctx.crc32.as_ref() {
        let computed = crc.finalize();
        if computed != resolved.decoded.fields.crc32 {
            warn!(
                filename,
                expected = resolved.decoded.fields.crc32,
                computed,
                "downloaded content crc32 does not match file id"
            );
        }
    }

    state.stats.success_read_count();
    Ok(DownloadResult { content })
}
