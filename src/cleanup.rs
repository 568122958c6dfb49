//! Cleanup and rollback (spec.md §4.H).
//!
//! One [`crate::context::OpCallbacks`] implementation per upload
//! variant, installed on the [`crate::context::FileContext`] before it
//! is handed to the dispatcher. `on_cleanup` runs on disconnect or a
//! mid-stream error and must be idempotent (spec.md §8 P5) -- callers
//! rely on [`crate::context::FileContext::cleaned_up`] for that, not
//! this module.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, warn};

use crate::context::{Completion, FileContext, OpCallbacks};
use crate::trunk::TrunkAllocator;

fn now_unix() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as u32
}

/// Regular and appender uploads write straight to a temporary path;
/// the caller renames it into place once the final CRC32-derived file
/// ID is known (spec.md §4.G step 4). Cleanup here only ever has to
/// discard that temporary file.
pub struct NormalUploadCallbacks;

impl OpCallbacks for NormalUploadCallbacks {
    fn on_done(&mut self, _ctx: &mut FileContext, _result: Completion) {}

    fn on_cleanup(&mut self, ctx: &mut FileContext) {
        if ctx.offset < ctx.end {
            if let Err(err) = std::fs::remove_file(&ctx.target_path) {
                warn!(path = %ctx.target_path.display(), %err, "failed to unlink partial upload");
            }
        }
    }
}

/// Append: a failed append must not leave bytes past the file's
/// pre-append size (spec.md §8 P2).
pub struct AppendCallbacks;

impl OpCallbacks for AppendCallbacks {
    fn on_done(&mut self, _ctx: &mut FileContext, _result: Completion) {}

    fn on_cleanup(&mut self, ctx: &mut FileContext) {
        if ctx.start < ctx.offset && ctx.offset < ctx.end {
            if let Some(file) = ctx.file.as_ref() {
                if let Err(err) = file.set_len(ctx.start) {
                    error!(path = %ctx.target_path.display(), %err, "failed to truncate partial append back to start");
                }
            }
        }
    }
}

/// Modify: bytes past `start` were not necessarily the caller's, so
/// the cleanup handler only logs (spec.md §4.H "Appender modify").
pub struct ModifyCallbacks;

impl OpCallbacks for ModifyCallbacks {
    fn on_done(&mut self, _ctx: &mut FileContext, _result: Completion) {}

    fn on_cleanup(&mut self, ctx: &mut FileContext) {
        warn!(
            path = %ctx.target_path.display(),
            start = ctx.start,
            offset = ctx.offset,
            end = ctx.end,
            "partial modify left file in an unknown state"
        );
    }
}

/// Truncate installs no rollback of its own: a failed `ftruncate`
/// already leaves the file in a well-defined (old or new) length.
pub struct TruncateCallbacks;

impl OpCallbacks for TruncateCallbacks {
    fn on_done(&mut self, _ctx: &mut FileContext, _result: Completion) {}

    fn on_cleanup(&mut self, _ctx: &mut FileContext) {}
}

/// Trunk-resident upload: allocates the slot before the container is
/// opened, commits the slot header on success, frees the slot on
/// abort (spec.md §4.F "dio_write_file... invoke before_open_callback
/// (may allocate a trunk slot)", §4.C `confirm`/`free`, §4.H "Trunk
/// write").
pub struct TrunkUploadCallbacks {
    pub allocator: Arc<TrunkAllocator>,
    pub requested_size: u32,
    pub file_type: u8,
    pub ext: String,
}

impl OpCallbacks for TrunkUploadCallbacks {
    fn before_open(&mut self, ctx: &mut FileContext) -> Completion {
        let info = self.allocator.alloc(self.requested_size)?;
        let container = self.allocator.open_container(info.file_id)?;
        crate::trunk::header::check_slot_free(&container, info.offset as u64)?;
        ctx.target_path = self.allocator.container_path(info.file_id);
        ctx.trunk = Some(info);
        // Stash the already-open container handle directly: `ctx.flags`
        // carries `create(true).truncate(true)` for the temp-path case,
        // and running that through `open(2)` against a shared container
        // would zero out every slot already packed into it.
        ctx.file = Some(container);
        Ok(())
    }

    fn before_close(&mut self, ctx: &mut FileContext) -> Completion {
        let trunk = ctx.trunk.expect("trunk upload context must carry trunk info");
        let crc32 = ctx.crc32.as_ref().map(|c| c.finalize()).unwrap_or(0);
        let file_size = (ctx.offset - ctx.start) as u32;
        self.allocator.confirm(trunk, file_size, crc32, self.file_type, &self.ext)?;
        Ok(())
    }

    fn on_done(&mut self, _ctx: &mut FileContext, _result: Completion) {}

    fn on_cleanup(&mut self, ctx: &mut FileContext) {
        if ctx.start < ctx.offset && ctx.offset < ctx.end {
            if let Some(trunk) = ctx.trunk {
                if let Err(err) = self.allocator.free(trunk) {
                    error!(?trunk, %err, "failed to free trunk slot during cleanup");
                }
            }
        }
    }
}

/// Downloads mutate nothing; cleanup is closing the fd, which
/// [`crate::dio::worker`]'s `finish` already does for every op kind.
pub struct DownloadCallbacks;

impl OpCallbacks for DownloadCallbacks {
    fn on_done(&mut self, _ctx: &mut FileContext, _result: Completion) {}

    fn on_cleanup(&mut self, _ctx: &mut FileContext) {}
}

/// Stamps a just-allocated trunk header's `mtime` field; kept here
/// rather than in `trunk::header` since only the cleanup/commit path
/// needs wall-clock time.
pub fn mtime_now() -> u32 {
    now_unix()
}
