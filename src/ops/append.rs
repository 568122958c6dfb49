//! Append (spec.md §4.G "Append": receive bytes from the current end
//! of file to `end = start + length`).

use std::os::unix::io::RawFd;

use crate::cleanup::AppendCallbacks;
use crate::context::{FileContext, OpKind, OpenFlags};
use crate::dio::NextStage;
use crate::error::{Result, StorageError};

use super::ServerState;

const CHUNK_SIZE: usize = 256 * 1024;

pub async fn handle(state: &ServerState, socket_fd: RawFd, filename: &str, body: Vec<u8>) -> Result<()> {
    state.stats.total_append_count();

    let resolved = super::resolve_filename(&state.registry, filename)?;
    super::require_appender(&resolved, state.allocator_for(resolved.store_path.index).as_ref())?;

    let start = std::fs::metadata(&resolved.content_path)?.len();
    let end = start + body.len() as u64;
    let path_index = resolved.store_path.index;

    let mut ctx = Box::new(
        FileContext::new(OpKind::Write, resolved.content_path.clone(), OpenFlags::write_appender_existing())
            .with_range(start, end)
            .with_hooks(Box::new(AppendCallbacks)),
    );

    let chunks: Vec<&[u8]> = if body.is_empty() { vec![&[][..]] } else { body.chunks(CHUNK_SIZE).collect() };
    for chunk in chunks {
        let rx = state.dispatcher.submit_write(path_index, socket_fd as i32, ctx, chunk.to_vec());
        let (returned_ctx, next) = rx.await.map_err(|_| StorageError::Aborted)?;
        ctx = returned_ctx;
        match next {
            NextStage::Recv => continue,
            NextStage::Done(Ok(())) => break,
            NextStage::Done(Err(err)) => return Err(err),
            NextStage::Send => return Err(StorageError::InvalidArgument("write handler asked to send".into())),
        }
    }

    state.stats.touch_last_file_update(super::now_unix() as i64);
    state.stats.success_append_count();
    Ok(())
}
