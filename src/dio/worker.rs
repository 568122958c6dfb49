//! Per-operation DIO handlers (spec.md §4.F).
//!
//! Each function takes ownership of the popped [`FileContext`],
//! performs its blocking syscalls, and returns the context plus the
//! [`NextStage`] the network task should resume in. The handler never
//! talks to the network directly.

use std::io::{Seek, SeekFrom};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, warn};

use crate::context::{Completion, FileContext, OpKind};
use crate::error::StorageError;
use crate::path_registry::PathRegistry;
use crate::stats::Stats;
use crate::trunk::TrunkAllocator;

use super::queue::BlockingQueue;
use super::{Job, NextStage};

/// Worker thread main loop (spec.md §4.F "Worker loop"). Pops a
/// context, invokes its operation-specific handler, and replies.
/// Exits once the queue is closed and drained.
pub fn run(
    queue: Arc<BlockingQueue<Job>>,
    _path_root: PathBuf,
    allocator: Option<Arc<TrunkAllocator>>,
    _registry: Arc<PathRegistry>,
    stats: Arc<Stats>,
) {
    while let Some(job) = queue.pop() {
        let Job { mut ctx, chunk, reply } = job;
        let next = dispatch(&mut ctx, chunk, allocator.as_deref(), &stats);
        let _ = reply.send((ctx, next));
    }
}

fn dispatch(
    ctx: &mut FileContext,
    chunk: Option<Vec<u8>>,
    allocator: Option<&TrunkAllocator>,
    stats: &Stats,
) -> NextStage {
    match ctx.op {
        OpKind::Open => open_file(ctx, stats),
        OpKind::Read => read_file(ctx, stats),
        OpKind::Write => write_file(ctx, chunk.as_deref().unwrap_or(&[]), stats),
        OpKind::Truncate => truncate_file(ctx, stats),
        OpKind::DeleteNormal => delete_normal_file(ctx, stats),
        OpKind::DeleteTrunk => delete_trunk_file(ctx, allocator, stats),
        OpKind::Discard => discard_file(ctx, chunk.as_deref().map(|c| c.len()).unwrap_or(0)),
    }
}

fn finish(ctx: &mut FileContext, result: Completion) -> NextStage {
    if let Some(file) = ctx.file.take() {
        drop(file);
    }
    if let Some(mut hooks) = ctx.hooks.take() {
        hooks.on_done(ctx, result.clone());
        ctx.hooks = Some(hooks);
    }
    NextStage::Done(result)
}

fn cleanup(ctx: &mut FileContext, stats: &Stats) -> NextStage {
    if ctx.cleaned_up {
        return NextStage::Done(Err(StorageError::Aborted));
    }
    ctx.cleaned_up = true;
    if let Some(mut hooks) = ctx.hooks.take() {
        hooks.on_cleanup(ctx);
        ctx.hooks = Some(hooks);
    } else {
        stats.record_cleanup_failure();
    }
    NextStage::Done(Err(StorageError::Aborted))
}

/// `dio_open_file` (spec.md §4.F).
fn open_file(ctx: &mut FileContext, stats: &Stats) -> NextStage {
    stats.total_open_count();
    if ctx.file.is_none() {
        match ctx.flags.to_open_options().mode(0o644).open(&ctx.target_path) {
            Ok(file) => ctx.file = Some(file),
            Err(err) => return finish(ctx, Err(err.into())),
        }
    }
    stats.success_open_count();

    if ctx.offset > 0 {
        let file = ctx.file.as_mut().expect("just opened");
        if let Err(err) = file.seek(SeekFrom::Start(ctx.offset)) {
            return finish(ctx, Err(err.into()));
        }
    }
    NextStage::Done(Ok(()))
}

fn open_for_handler(ctx: &mut FileContext) -> Result<(), StorageError> {
    if ctx.file.is_none() {
        if let Some(mut hooks) = ctx.hooks.take() {
            let result = hooks.before_open(ctx);
            ctx.hooks = Some(hooks);
            result?;
        }
    }
    // `before_open` may have stashed an already-open handle (trunk
    // uploads do, to avoid re-opening the shared container through
    // `ctx.flags`'s create/truncate semantics); only open fresh if it
    // didn't.
    if ctx.file.is_none() {
        let file = ctx.flags.to_open_options().mode(0o644).open(&ctx.target_path)?;
        ctx.file = Some(file);
    }
    Ok(())
}

/// `dio_read_file` (spec.md §4.F).
fn read_file(ctx: &mut FileContext, stats: &Stats) -> NextStage {
    stats.total_read_count();
    if let Err(err) = open_for_handler(ctx) {
        return finish(ctx, Err(err));
    }

    const CHUNK_CAP: u64 = 256 * 1024;
    let read_bytes = ctx.remaining().min(CHUNK_CAP) as usize;
    let mut buf = vec![0u8; read_bytes];

    let file = ctx.file.as_ref().expect("opened above");
    let result = file.read_exact_at(&mut buf, ctx.physical_offset());
    match result {
        Ok(()) => {
            if let Some(crc) = ctx.crc32.as_mut() {
                crc.update(&buf);
            }
            ctx.offset += read_bytes as u64;
            ctx.pending_send_buf = Some(buf);

            if !ctx.is_complete() {
                NextStage::Send
            } else {
                stats.success_read_count();
                finish(ctx, Ok(()))
            }
        }
        Err(err) => finish(ctx, Err(err.into())),
    }
}

/// `dio_write_file` (spec.md §4.F).
fn write_file(ctx: &mut FileContext, chunk: &[u8], stats: &Stats) -> NextStage {
    stats.total_write_count();
    if let Err(err) = open_for_handler(ctx) {
        return finish(ctx, Err(err));
    }

    let data = &chunk[ctx.buff_offset..];
    let file = ctx.file.as_ref().expect("opened above");
    match file.write_all_at(data, ctx.physical_offset()) {
        Ok(()) => {
            if let Some(crc) = ctx.crc32.as_mut() {
                crc.update(data);
            }
            if let Some(hash) = ctx.hash.as_mut() {
                hash.update(data);
            }
            ctx.offset += data.len() as u64;
            ctx.buff_offset = 0;

            if !ctx.is_complete() {
                NextStage::Recv
            } else {
                let before_close_result =
                    ctx.hooks.take().map(|mut hooks| {
                        let r = hooks.before_close(ctx);
                        ctx.hooks = Some(hooks);
                        r
                    });
                match before_close_result {
                    Some(Err(err)) => {
                        let _ = cleanup(ctx, stats);
                        finish(ctx, Err(err))
                    }
                    _ => {
                        stats.success_write_count();
                        finish(ctx, Ok(()))
                    }
                }
            }
        }
        Err(err) => {
            let _ = cleanup(ctx, stats);
            finish(ctx, Err(err.into()))
        }
    }
}

/// `dio_truncate_file` (spec.md §4.F).
fn truncate_file(ctx: &mut FileContext, stats: &Stats) -> NextStage {
    stats.total_truncate_count();
    if let Err(err) = open_for_handler(ctx) {
        return finish(ctx, Err(err));
    }

    let file = ctx.file.as_ref().expect("opened above");
    if let Err(err) = file.set_len(ctx.offset) {
        return finish(ctx, Err(err.into()));
    }

    if let Some(mut hooks) = ctx.hooks.take() {
        let result = hooks.before_close(ctx);
        ctx.hooks = Some(hooks);
        if let Err(err) = result {
            return finish(ctx, Err(err));
        }
    }
    stats.success_truncate_count();
    finish(ctx, Ok(()))
}

/// `dio_delete_normal_file` (spec.md §4.F).
fn delete_normal_file(ctx: &mut FileContext, stats: &Stats) -> NextStage {
    stats.total_delete_count();
    match std::fs::remove_file(&ctx.target_path) {
        Ok(()) => {
            stats.success_delete_count();
            finish(ctx, Ok(()))
        }
        Err(err) => {
            warn!(path = %ctx.target_path.display(), %err, "failed to unlink normal file");
            finish(ctx, Err(err.into()))
        }
    }
}

/// `dio_delete_trunk_file` (spec.md §4.F).
fn delete_trunk_file(ctx: &mut FileContext, allocator: Option<&TrunkAllocator>, stats: &Stats) -> NextStage {
    stats.total_delete_count();
    let Some(trunk) = ctx.trunk else {
        return finish(ctx, Err(StorageError::InvalidArgument("delete_trunk_file without trunk info".into())));
    };
    let Some(allocator) = allocator else {
        return finish(ctx, Err(StorageError::InvalidArgument("trunk storage not enabled on this path".into())));
    };
    match allocator.free(trunk) {
        Ok(()) => {
            stats.success_delete_count();
            finish(ctx, Ok(()))
        }
        Err(err) => {
            error!(?trunk, %err, "failed to free trunk slot");
            finish(ctx, Err(err))
        }
    }
}

/// `dio_discard_file` (spec.md §4.F): consumes a client upload whose
/// destination is already invalid, without writing.
fn discard_file(ctx: &mut FileContext, chunk_len: usize) -> NextStage {
    ctx.offset += chunk_len as u64;
    if ctx.is_complete() {
        finish(ctx, Ok(()))
    } else {
        NextStage::Recv
    }
}

