//! Truncate (spec.md §4.G "Truncate": set the file length to a given
//! size, 0 allowed; must be an appender file).

use std::os::unix::io::RawFd;

use crate::cleanup::TruncateCallbacks;
use crate::context::{FileContext, OpKind, OpenFlags};
use crate::dio::NextStage;
use crate::error::{Result, StorageError};

use super::ServerState;

pub async fn handle(state: &ServerState, socket_fd: RawFd, filename: &str, new_size: u64) -> Result<()> {
    state.stats.total_truncate_count();

    let resolved = super::resolve_filename(&state.registry, filename)?;
    super::require_appender(&resolved, state.allocator_for(resolved.store_path.index).as_ref())?;

    let path_index = resolved.store_path.index;
    let ctx = Box::new(
        FileContext::new(OpKind::Truncate, resolved.content_path.clone(), OpenFlags::write_appender_existing())
            .with_range(new_size, new_size)
            .with_hooks(Box::new(TruncateCallbacks)),
    );

    let rx = state.dispatcher.submit_control(path_index, socket_fd as i32, ctx);
    let (_ctx, next) = rx.await.map_err(|_| StorageError::Aborted)?;
    match next {
        NextStage::Done(Ok(())) => {
            state.stats.success_truncate_count();
            Ok(())
        }
        NextStage::Done(Err(err)) => Err(err),
        _ => Err(StorageError::InvalidArgument("truncate handler returned an unexpected stage".into())),
    }
}
