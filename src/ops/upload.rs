//! Upload (spec.md §4.G "Regular upload", "Trunk upload", "Appender
//! upload"), plus the `upload-slave` variant supplemented in
//! `SPEC_FULL.md` §3.
//!
//! The network-task layer hands this handler the whole request body
//! already buffered in memory (see `DESIGN.md`); this module re-chunks
//! it into fixed-size pieces and pushes each through
//! [`crate::dio::Dispatcher::submit_write`] in turn, so the real
//! chunked-write state machine in `crate::dio::worker` still runs
//! exactly as it would for a streamed upload.

use std::os::unix::io::RawFd;

use crate::cleanup::{NormalUploadCallbacks, TrunkUploadCallbacks};
use crate::context::{FileContext, OpKind, OpenFlags};
use crate::dio::NextStage;
use crate::error::{Result, StorageError};
use crate::fileid::FileIdFields;
use crate::trunk::header::file_type;

use super::ServerState;

const CHUNK_SIZE: usize = 256 * 1024;

/// Which upload variant is being driven; all three share the same
/// chunked-write loop and differ only in open flags, rollback hooks,
/// and where the temp file lives.
pub enum UploadMode {
    Normal,
    Appender,
    /// A pre-assigned remote filename, attached alongside an existing
    /// master file's subdirectory rather than a freshly chosen one.
    Slave { remote_filename: String },
}

pub async fn handle(
    state: &ServerState,
    socket_fd: RawFd,
    mode: UploadMode,
    file_ext_name: &str,
    file_size: u64,
    body: Vec<u8>,
) -> Result<String> {
    state.stats.total_upload_count();

    if body.len() as u64 != file_size {
        return Err(StorageError::InvalidArgument(format!(
            "declared file_size {file_size} does not match body length {}",
            body.len()
        )));
    }

    let (store_path, xx, yy) = match &mode {
        UploadMode::Slave { remote_filename } => {
            let resolved = super::resolve_filename(&state.registry, remote_filename)?;
            let (xx, yy) = extract_subdir(remote_filename)?;
            (resolved.store_path, xx, yy)
        }
        UploadMode::Normal | UploadMode::Appender => {
            let store_path = state.registry.acquire_path(file_size)?;
            let salt = super::next_salt();
            let (xx, yy) = store_path.subdir_for(salt);
            (store_path, xx, yy)
        }
    };

    let path_index = store_path.index;
    let salt = super::next_salt();
    let temp_path = store_path.subdir_path(xx, yy).join(format!("tmp-{salt:08x}"));

    let trunk_threshold = state.config.trunk_file_size.saturating_sub(crate::trunk::HEADER_SIZE as u64);
    let use_trunk = state.config.trunk_enabled && matches!(mode, UploadMode::Normal) && file_size <= trunk_threshold;

    let file_type_bits = match mode {
        UploadMode::Appender => file_type::APPENDER,
        _ => file_type::REGULAR,
    };

    let ctx = if use_trunk {
        let allocator = state
            .allocator_for(path_index)
            .ok_or_else(|| StorageError::InvalidArgument("trunk storage not enabled on this path".into()))?;
        FileContext::new(OpKind::Write, temp_path.clone(), OpenFlags::write_new())
            .with_range(0, file_size)
            .with_crc32()
            .with_hash(state.config.file_signature_method)
            .with_hooks(Box::new(TrunkUploadCallbacks {
                allocator,
                requested_size: file_size as u32,
                file_type: file_type_bits,
                ext: file_ext_name.to_string(),
            }))
    } else {
        FileContext::new(OpKind::Write, temp_path.clone(), OpenFlags::write_new())
            .with_range(0, file_size)
            .with_crc32()
            .with_hash(state.config.file_signature_method)
            .with_hooks(Box::new(NormalUploadCallbacks))
    };

    // A zero-byte upload still needs one write submission to drive
    // `open`/`before_close` through the state machine, so an empty
    // body is treated as a single empty chunk rather than no chunks.
    let chunks: Vec<&[u8]> =
        if body.is_empty() { vec![&[][..]] } else { body.chunks(CHUNK_SIZE.max(1)).collect() };

    let mut ctx = Box::new(ctx);
    for chunk in chunks {
        let rx = state.dispatcher.submit_write(path_index, socket_fd as i32, ctx, chunk.to_vec());
        let (returned_ctx, next) = rx.await.map_err(|_| StorageError::Aborted)?;
        ctx = returned_ctx;
        match next {
            NextStage::Recv => continue,
            NextStage::Done(Ok(())) => break,
            NextStage::Done(Err(err)) => return Err(err),
            NextStage::Send => {
                return Err(StorageError::InvalidArgument("write handler asked to send".into()))
            }
        }
    }

    let crc32 = ctx.crc32.as_ref().map(|c| c.finalize()).unwrap_or(0);
    let trunk_location = ctx.trunk.map(Into::into);

    let fields =
        FileIdFields { source_ip: state.server_ip, timestamp: super::now_unix(), size: file_size, crc32, salt };
    let encoded = crate::fileid::encode(&fields, file_ext_name, trunk_location)?;

    if trunk_location.is_none() {
        let final_path = store_path.subdir_path(xx, yy).join(&encoded);
        let is_appender = matches!(mode, UploadMode::Appender);
        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::rename(&temp_path, &final_path)?;
            if is_appender {
                super::mark_as_appender(&final_path)?;
            }
            Ok(())
        })
        .await
        .map_err(|_| StorageError::Io(std::io::Error::other("rename task panicked")))??;
    }

    store_path.debit(file_size);
    state.stats.touch_last_file_update(super::now_unix() as i64);
    state.stats.success_upload_count();

    Ok(super::format_remote_filename(path_index, xx, yy, &encoded))
}

fn extract_subdir(remote_filename: &str) -> Result<(u16, u16)> {
    let mut parts = remote_filename.splitn(4, '/');
    let _index = parts.next();
    let xx_str = parts.next();
    let yy_str = parts.next();
    let invalid = || StorageError::InvalidArgument(format!("malformed remote filename: {remote_filename:?}"));
    let xx = u16::from_str_radix(xx_str.ok_or_else(invalid)?, 16).map_err(|_| invalid())?;
    let yy = u16::from_str_radix(yy_str.ok_or_else(invalid)?, 16).map_err(|_| invalid())?;
    Ok((xx, yy))
}
