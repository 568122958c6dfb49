//! Global statistics (spec.md §4.I).
//!
//! A single record of wrapping atomic counters held by the storage
//! server instance, read by the tracker-heartbeat path (out of scope
//! here) via [`Stats::snapshot`]. Per Design Notes §9, this replaces
//! the source's global mutable counters with one struct owned by the
//! server.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Counter pair plus a plain-data snapshot, one per op kind in
/// spec.md §4.I's list.
#[derive(Default)]
pub struct Stats {
    pub total_open_count: AtomicU64,
    pub success_open_count: AtomicU64,
    pub total_read_count: AtomicU64,
    pub success_read_count: AtomicU64,
    pub total_write_count: AtomicU64,
    pub success_write_count: AtomicU64,
    pub total_sync_count: AtomicU64,
    pub success_sync_count: AtomicU64,
    pub total_set_meta_count: AtomicU64,
    pub success_set_meta_count: AtomicU64,
    pub total_get_meta_count: AtomicU64,
    pub success_get_meta_count: AtomicU64,
    pub total_upload_count: AtomicU64,
    pub success_upload_count: AtomicU64,
    pub total_append_count: AtomicU64,
    pub success_append_count: AtomicU64,
    pub total_modify_count: AtomicU64,
    pub success_modify_count: AtomicU64,
    pub total_truncate_count: AtomicU64,
    pub success_truncate_count: AtomicU64,
    pub total_delete_count: AtomicU64,
    pub success_delete_count: AtomicU64,
    /// UNIX seconds of the last successful upload/append/modify.
    pub last_file_update_time: AtomicI64,
    /// UNIX seconds the statistics were last refreshed from a source
    /// (e.g. a binlog replay on restart).
    pub last_source_update_time: AtomicI64,
    /// Cleanup handlers (spec.md §9, "best effort... surface
    /// metrics") that ran but whose ftruncate/unlink failed.
    pub cleanup_failures: AtomicU64,
}

/// Plain-old-data snapshot of [`Stats`] for the heartbeat path.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatsSnapshot {
    pub total_open_count: u64,
    pub success_open_count: u64,
    pub total_read_count: u64,
    pub success_read_count: u64,
    pub total_write_count: u64,
    pub success_write_count: u64,
    pub total_sync_count: u64,
    pub success_sync_count: u64,
    pub total_set_meta_count: u64,
    pub success_set_meta_count: u64,
    pub total_get_meta_count: u64,
    pub success_get_meta_count: u64,
    pub total_upload_count: u64,
    pub success_upload_count: u64,
    pub total_append_count: u64,
    pub success_append_count: u64,
    pub total_modify_count: u64,
    pub success_modify_count: u64,
    pub total_truncate_count: u64,
    pub success_truncate_count: u64,
    pub total_delete_count: u64,
    pub success_delete_count: u64,
    pub last_file_update_time: i64,
    pub last_source_update_time: i64,
    pub cleanup_failures: u64,
}

macro_rules! incr_helpers {
    ($($name:ident: $total:ident, $success:ident);+ $(;)?) => {
        $(
            /// Increments the total counter for this op kind; call at
            /// dispatch time regardless of outcome.
            pub fn $total(&self) {
                self.$total.fetch_add(1, Ordering::Relaxed);
            }

            /// Increments the success counter for this op kind; call
            /// only once the op actually completed without error.
            pub fn $success(&self) {
                self.$success.fetch_add(1, Ordering::Relaxed);
            }
        )+
    };
}

impl Stats {
    /// Reads a point-in-time snapshot suitable for the heartbeat path.
    /// Uses relaxed ordering throughout: these are independent
    /// monotone counters, not a transaction.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_open_count: self.total_open_count.load(Ordering::Relaxed),
            success_open_count: self.success_open_count.load(Ordering::Relaxed),
            total_read_count: self.total_read_count.load(Ordering::Relaxed),
            success_read_count: self.success_read_count.load(Ordering::Relaxed),
            total_write_count: self.total_write_count.load(Ordering::Relaxed),
            success_write_count: self.success_write_count.load(Ordering::Relaxed),
            total_sync_count: self.total_sync_count.load(Ordering::Relaxed),
            success_sync_count: self.success_sync_count.load(Ordering::Relaxed),
            total_set_meta_count: self.total_set_meta_count.load(Ordering::Relaxed),
            success_set_meta_count: self.success_set_meta_count.load(Ordering::Relaxed),
            total_get_meta_count: self.total_get_meta_count.load(Ordering::Relaxed),
            success_get_meta_count: self.success_get_meta_count.load(Ordering::Relaxed),
            total_upload_count: self.total_upload_count.load(Ordering::Relaxed),
            success_upload_count: self.success_upload_count.load(Ordering::Relaxed),
            total_append_count: self.total_append_count.load(Ordering::Relaxed),
            success_append_count: self.success_append_count.load(Ordering::Relaxed),
            total_modify_count: self.total_modify_count.load(Ordering::Relaxed),
            success_modify_count: self.success_modify_count.load(Ordering::Relaxed),
            total_truncate_count: self.total_truncate_count.load(Ordering::Relaxed),
            success_truncate_count: self.success_truncate_count.load(Ordering::Relaxed),
            total_delete_count: self.total_delete_count.load(Ordering::Relaxed),
            success_delete_count: self.success_delete_count.load(Ordering::Relaxed),
            last_file_update_time: self.last_file_update_time.load(Ordering::Relaxed),
            last_source_update_time: self.last_source_update_time.load(Ordering::Relaxed),
            cleanup_failures: self.cleanup_failures.load(Ordering::Relaxed),
        }
    }

    /// Records the current time as the last file update, called after
    /// a successful upload/append/modify commits.
    pub fn touch_last_file_update(&self, unix_seconds: i64) {
        self.last_file_update_time.store(unix_seconds, Ordering::Relaxed);
    }

    incr_helpers!(
        open: total_open_count, success_open_count;
        read: total_read_count, success_read_count;
        write: total_write_count, success_write_count;
        sync: total_sync_count, success_sync_count;
        set_meta: total_set_meta_count, success_set_meta_count;
        get_meta: total_get_meta_count, success_get_meta_count;
        upload: total_upload_count, success_upload_count;
        append: total_append_count, success_append_count;
        modify: total_modify_count, success_modify_count;
        truncate: total_truncate_count, success_truncate_count;
        delete: total_delete_count, success_delete_count;
    );

    /// Records a best-effort cleanup failure (spec.md §9).
    pub fn record_cleanup_failure(&self) {
        self.cleanup_failures.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = Stats::default();
        let snap = stats.snapshot();
        assert_eq!(snap.total_upload_count, 0);
        assert_eq!(snap.success_upload_count, 0);
    }

    #[test]
    fn incrementing_total_does_not_bump_success() {
        let stats = Stats::default();
        stats.total_upload_count();
        let snap = stats.snapshot();
        assert_eq!(snap.total_upload_count, 1);
        assert_eq!(snap.success_upload_count, 0);
    }

    #[test]
    fn success_after_total_reflects_both() {
        let stats = Stats::default();
        stats.total_write_count();
        stats.success_write_count();
        let snap = stats.snapshot();
        assert_eq!(snap.total_write_count, 1);
        assert_eq!(snap.success_write_count, 1);
    }

    #[test]
    fn cleanup_failures_accumulate() {
        let stats = Stats::default();
        stats.record_cleanup_failure();
        stats.record_cleanup_failure();
        assert_eq!(stats.snapshot().cleanup_failures, 2);
    }
}
