//! DIO dispatcher (spec.md §4.F): thread pools that bind read and
//! write requests to dedicated OS threads, one set per store path.
//!
//! The network side stays on Tokio tasks; these are plain
//! `std::thread`s performing blocking syscalls, the only place in the
//! core that calls `read`/`write`/`open`/`ftruncate`/`unlink` on file
//! contents (spec.md §5).

mod queue;
pub mod worker;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::context::{Completion, FileContext};
use crate::path_registry::PathRegistry;
use crate::stats::Stats;
use crate::trunk::TrunkAllocator;

use queue::BlockingQueue;

/// What stage the network task should resume in once a DIO handler
/// returns control (spec.md §4.F).
#[derive(Debug)]
pub enum NextStage {
    /// Ask the client for (or buffer) more bytes, then resubmit.
    Recv,
    /// Flush buffered bytes to the client, then resubmit.
    Send,
    /// The operation is finished, successfully or not.
    Done(Completion),
}

/// One queued unit of work: a context plus, for write-shaped ops, the
/// chunk of bytes just received from the network.
pub struct Job {
    pub ctx: Box<FileContext>,
    pub chunk: Option<Vec<u8>>,
    pub reply: oneshot::Sender<(Box<FileContext>, NextStage)>,
}

const QUEUE_CAPACITY: usize = 256;

struct ThreadPool {
    queues: Vec<Arc<BlockingQueue<Job>>>,
    handles: Vec<std::thread::JoinHandle<()>>,
}

impl ThreadPool {
    fn spawn(
        name: &str,
        path_index: usize,
        count: usize,
        path_root: std::path::PathBuf,
        allocator: Option<Arc<TrunkAllocator>>,
        registry: Arc<PathRegistry>,
        stats: Arc<Stats>,
        thread_count: Arc<AtomicI64>,
    ) -> Self {
        let mut queues = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for i in 0..count {
            let queue = Arc::new(BlockingQueue::new(QUEUE_CAPACITY));
            let queue_for_thread = Arc::clone(&queue);
            let path_root = path_root.clone();
            let allocator = allocator.clone();
            let registry = Arc::clone(&registry);
            let stats = Arc::clone(&stats);
            let thread_count = Arc::clone(&thread_count);

            let thread_name = format!("dio-{name}-{path_index}-{i}");
            thread_count.fetch_add(1, Ordering::SeqCst);
            let handle = std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    info!(thread = %thread_name, "DIO worker started");
                    worker::run(queue_for_thread, path_root, allocator, registry, stats);
                    thread_count.fetch_sub(1, Ordering::SeqCst);
                })
                .expect("failed to spawn DIO worker thread");

            queues.push(queue);
            handles.push(handle);
        }

        Self { queues, handles }
    }

    fn queue_for(&self, socket_fd: i32) -> &Arc<BlockingQueue<Job>> {
        let idx = (socket_fd as usize) % self.queues.len();
        &self.queues[idx]
    }

    fn shutdown(self) {
        for queue in &self.queues {
            queue.close();
        }
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Per-store-path pair of thread pools (spec.md §4.F). When
/// `disk_rw_separated` is false both fields point at the same pool.
struct PathPools {
    readers: ThreadPool,
    writers: ThreadPool,
}

/// Owns every store path's reader/writer thread pools and routes
/// [`FileContext`]s to them by thread-affinity hash.
pub struct Dispatcher {
    pools: Vec<PathPools>,
    thread_count: Arc<AtomicI64>,
}

impl Dispatcher {
    pub fn start(
        config: &StorageConfig,
        registry: Arc<PathRegistry>,
        allocators: &[Option<Arc<TrunkAllocator>>],
        stats: Arc<Stats>,
    ) -> Self {
        let (reader_count, writer_count) = config.threads_per_path();
        let thread_count = Arc::new(AtomicI64::new(0));
        let mut pools = Vec::with_capacity(config.store_paths.len());

        for (index, root) in config.store_paths.iter().enumerate() {
            let allocator = allocators.get(index).cloned().flatten();
            let readers = ThreadPool::spawn(
                "r",
                index,
                reader_count,
                root.clone(),
                allocator.clone(),
                Arc::clone(&registry),
                Arc::clone(&stats),
                Arc::clone(&thread_count),
            );
            let writers = if config.disk_rw_separated {
                ThreadPool::spawn(
                    "w",
                    index,
                    writer_count,
                    root.clone(),
                    allocator,
                    Arc::clone(&registry),
                    Arc::clone(&stats),
                    Arc::clone(&thread_count),
                )
            } else {
                ThreadPool { queues: readers.queues.clone(), handles: Vec::new() }
            };
            pools.push(PathPools { readers, writers });
        }

        Self { pools, thread_count }
    }

    /// Submits a context to the reader pool of `path_index`, pinned to
    /// the worker thread `socket_fd` hashes to.
    pub fn submit_read(
        &self,
        path_index: usize,
        socket_fd: i32,
        ctx: Box<FileContext>,
    ) -> oneshot::Receiver<(Box<FileContext>, NextStage)> {
        self.submit(&self.pools[path_index].readers, socket_fd, ctx, None)
    }

    /// Submits a context plus a just-received chunk to the writer pool
    /// of `path_index`.
    pub fn submit_write(
        &self,
        path_index: usize,
        socket_fd: i32,
        ctx: Box<FileContext>,
        chunk: Vec<u8>,
    ) -> oneshot::Receiver<(Box<FileContext>, NextStage)> {
        self.submit(&self.pools[path_index].writers, socket_fd, ctx, Some(chunk))
    }

    /// Submits a control-only context (truncate/delete/discard) to the
    /// writer pool, since these mutate on-disk state.
    pub fn submit_control(
        &self,
        path_index: usize,
        socket_fd: i32,
        ctx: Box<FileContext>,
    ) -> oneshot::Receiver<(Box<FileContext>, NextStage)> {
        self.submit(&self.pools[path_index].writers, socket_fd, ctx, None)
    }

    fn submit(
        &self,
        pool: &ThreadPool,
        socket_fd: i32,
        ctx: Box<FileContext>,
        chunk: Option<Vec<u8>>,
    ) -> oneshot::Receiver<(Box<FileContext>, NextStage)> {
        let (tx, rx) = oneshot::channel();
        let job = Job { ctx, chunk, reply: tx };
        if let Err(job) = pool.queue_for(socket_fd).push(job) {
            warn!("DIO queue full, dropping job");
            let _ = job.reply.send((job.ctx, NextStage::Done(Err(crate::error::StorageError::Io(
                std::io::Error::new(std::io::ErrorKind::WouldBlock, "DIO queue full"),
            )))));
        }
        rx
    }

    /// Number of live DIO worker threads, used by shutdown to wait for
    /// drain (spec.md §4.F "waits for `g_dio_thread_count` to reach
    /// zero").
    pub fn thread_count(&self) -> i64 {
        self.thread_count.load(Ordering::SeqCst)
    }

    pub fn shutdown(self) {
        for pools in self.pools {
            pools.readers.shutdown();
            // Shared-pool case already closed by `readers.shutdown()`.
            if !pools.writers.handles.is_empty() {
                pools.writers.shutdown();
            }
        }
    }
}
