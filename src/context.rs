//! [`FileContext`]: the mutable record describing one in-progress disk
//! I/O, passed between the network task and a DIO worker thread
//! (spec.md §3 "FileContext", §4.E).

use std::fs::File;
use std::path::PathBuf;

use crate::config::FileSignatureMethod;
use crate::crc::RunningCrc32;
use crate::error::StorageError;
use crate::hash::RunningHash;
use crate::trunk::TrunkInfo;

/// Which disk operation a [`FileContext`] drives. Spec.md §4.F lists
/// the DIO handlers this maps to one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Open,
    Read,
    Write,
    Truncate,
    DeleteNormal,
    DeleteTrunk,
    Discard,
}

/// Per-request open flags, translated to the `open(2)` flags/mode the
/// DIO `open` handler uses (spec.md §4.F "open with stored flags (mode
/// 0644)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
    pub append: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self { read: true, write: false, create: false, truncate: false, append: false }
    }

    pub fn write_new() -> Self {
        Self { read: false, write: true, create: true, truncate: true, append: false }
    }

    pub fn write_appender_existing() -> Self {
        Self { read: false, write: true, create: false, truncate: false, append: false }
    }

    pub fn to_open_options(self) -> std::fs::OpenOptions {
        let mut opts = std::fs::OpenOptions::new();
        opts.read(self.read).write(self.write).create(self.create).truncate(self.truncate);
        opts
    }
}

/// Outcome handed back to the network task when a [`FileContext`]'s
/// work finishes, successfully or not (spec.md §4.E "done_callback").
pub type Completion = Result<(), StorageError>;

/// The four request-scoped hooks named in spec.md §4.E/§9: open-time
/// hooks may allocate a trunk slot or create a directory, close-time
/// hooks may commit the slot header or link a temp file into place,
/// `on_done` hands control back to the network task, and `on_cleanup`
/// runs the per-operation rollback (spec.md §4.H) on abort.
///
/// This replaces the source's raw function-pointer callbacks with a
/// trait object per request (Design Notes §9).
pub trait OpCallbacks: Send {
    /// Runs before the file is opened; may mutate `ctx.trunk` (trunk
    /// allocation) or create parent directories.
    fn before_open(&mut self, _ctx: &mut FileContext) -> Completion {
        Ok(())
    }

    /// Runs after the last chunk is written, before the descriptor is
    /// closed; may commit a trunk header or rename a temp file.
    fn before_close(&mut self, _ctx: &mut FileContext) -> Completion {
        Ok(())
    }

    /// Runs once, after the descriptor is closed, with the final
    /// outcome (spec.md §4.E "done_callback").
    fn on_done(&mut self, ctx: &mut FileContext, result: Completion);

    /// Runs instead of `on_done` when the client disconnected or an
    /// error aborted the transfer mid-stream (spec.md §4.H). Must be
    /// idempotent (spec.md §8 P5).
    fn on_cleanup(&mut self, ctx: &mut FileContext);
}

/// Per-request mutable record describing one in-progress I/O
/// (spec.md §3/§4.E). Owned exclusively by one worker thread from
/// `queue_push` to `done_callback`; ownership then returns to the
/// network task.
pub struct FileContext {
    pub op: OpKind,
    /// Absolute path to the file (normal) or trunk container
    /// (trunk-resident) this context operates on.
    pub target_path: PathBuf,
    /// Open file descriptor, `None` until `dio_open_file` runs.
    pub file: Option<File>,
    /// Byte offset the next read/write happens at.
    pub offset: u64,
    /// Byte offset at which this operation is complete.
    pub end: u64,
    /// Starting offset, retained for cleanup (append rollback target).
    pub start: u64,
    pub flags: OpenFlags,
    /// How much of the network task's current chunk buffer has
    /// already been written (spec.md §4.F "buff_offset").
    pub buff_offset: usize,
    pub crc32: Option<RunningCrc32>,
    pub hash: Option<RunningHash>,
    /// Set when this context targets a trunk slot rather than a
    /// normal file; `target_path` then names the container and
    /// reads/writes are offset by `trunk.offset + HEADER_SIZE`.
    pub trunk: Option<TrunkInfo>,
    /// True once an error has already triggered cleanup, so repeated
    /// cleanup invocations are no-ops (spec.md §8 P5).
    pub cleaned_up: bool,
    /// Request-scoped callbacks (open/close/done/cleanup hooks).
    pub hooks: Option<Box<dyn OpCallbacks>>,
    /// Bytes read by the last `dio_read_file` call, waiting to be
    /// flushed to the client by the network task before resubmission.
    pub pending_send_buf: Option<Vec<u8>>,
}

impl FileContext {
    pub fn new(op: OpKind, target_path: PathBuf, flags: OpenFlags) -> Self {
        Self {
            op,
            target_path,
            file: None,
            offset: 0,
            end: 0,
            start: 0,
            flags,
            buff_offset: 0,
            crc32: None,
            hash: None,
            trunk: None,
            cleaned_up: false,
            hooks: None,
            pending_send_buf: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn OpCallbacks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_range(mut self, start: u64, end: u64) -> Self {
        self.start = start;
        self.offset = start;
        self.end = end;
        self
    }

    pub fn with_crc32(mut self) -> Self {
        self.crc32 = Some(RunningCrc32::new());
        self
    }

    pub fn with_hash(mut self, method: FileSignatureMethod) -> Self {
        self.hash = Some(RunningHash::new(method));
        self
    }

    pub fn with_trunk(mut self, trunk: TrunkInfo) -> Self {
        self.trunk = Some(trunk);
        self
    }

    /// Byte offset inside the target file/container the next I/O
    /// happens at, accounting for the trunk header when resident in a
    /// trunk container.
    pub fn physical_offset(&self) -> u64 {
        match &self.trunk {
            Some(info) => info.offset as u64 + crate::trunk::HEADER_SIZE as u64 + (self.offset - self.start),
            None => self.offset,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.offset)
    }

    pub fn is_complete(&self) -> bool {
        self.offset >= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_offset_without_trunk_is_logical_offset() {
        let ctx = FileContext::new(OpKind::Write, "/tmp/x".into(), OpenFlags::write_new())
            .with_range(10, 20);
        assert_eq!(ctx.physical_offset(), 10);
    }

    #[test]
    fn physical_offset_with_trunk_accounts_for_header_and_progress() {
        let trunk = TrunkInfo { file_id: 1, offset: 1000, size: 200 };
        let mut ctx = FileContext::new(OpKind::Write, "/tmp/trunk-1".into(), OpenFlags::write_new())
            .with_range(0, 100)
            .with_trunk(trunk);
        assert_eq!(ctx.physical_offset(), 1000 + crate::trunk::HEADER_SIZE as u64);
        ctx.offset = 40;
        assert_eq!(ctx.physical_offset(), 1000 + crate::trunk::HEADER_SIZE as u64 + 40);
    }

    #[test]
    fn remaining_and_is_complete_track_progress() {
        let mut ctx = FileContext::new(OpKind::Read, "/tmp/x".into(), OpenFlags::read_only())
            .with_range(0, 10);
        assert_eq!(ctx.remaining(), 10);
        assert!(!ctx.is_complete());
        ctx.offset = 10;
        assert_eq!(ctx.remaining(), 0);
        assert!(ctx.is_complete());
    }
}
