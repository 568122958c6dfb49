//! Delete (spec.md §4.F `dio_delete_normal_file` / `dio_delete_trunk_file`).
//!
//! Also removes the sibling `.meta` and `.appender` marker files, and
//! credits the freed space back to the store path's cached counter
//! (spec.md §4.A "Credits `size` bytes back after a delete").

use std::os::unix::io::RawFd;

use crate::context::{FileContext, OpKind, OpenFlags};
use crate::dio::NextStage;
use crate::error::{Result, StorageError};

use super::ServerState;

pub async fn handle(state: &ServerState, socket_fd: RawFd, filename: &str) -> Result<()> {
    state.stats.total_delete_count();

    let resolved = super::resolve_filename(&state.registry, filename)?;
    let path_index = resolved.store_path.index;

    let (op, freed_bytes) = match resolved.decoded.trunk {
        Some(trunk) => (OpKind::DeleteTrunk, trunk.slot_size as u64),
        None => {
            let freed = std::fs::metadata(&resolved.content_path).map(|m| m.len()).unwrap_or(0);
            (OpKind::DeleteNormal, freed)
        }
    };

    let mut ctx =
        Box::new(FileContext::new(op, resolved.content_path.clone(), OpenFlags::write_appender_existing()));
    if let Some(trunk) = resolved.decoded.trunk {
        ctx = Box::new((*ctx).with_trunk(trunk.into()));
    }

    let rx = state.dispatcher.submit_control(path_index, socket_fd as i32, ctx);
    let (_ctx, next) = rx.await.map_err(|_| StorageError::Aborted)?;
    match next {
        NextStage::Done(Ok(())) => {
            let _ = crate::metadata::remove(&resolved.content_path);
            let _ = std::fs::remove_file(super::appender_marker_path(&resolved.content_path));
            resolved.store_path.credit(freed_bytes);
            state.stats.success_delete_count();
            Ok(())
        }
        NextStage::Done(Err(err)) => Err(err),
        _ => Err(StorageError::InvalidArgument("delete handler returned an unexpected stage".into())),
    }
}
