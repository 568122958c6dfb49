//! Bounded blocking FIFO queue each DIO worker thread owns (spec.md
//! §4.F "a blocking FIFO queue of `FileContext*`").
//!
//! Built on the crate's existing lock-free [`ArrayQueue`] plus a
//! condvar, since `crossbeam-queue` gives a non-blocking ring buffer
//! and the dispatcher needs a worker thread to block when idle rather
//! than spin.

use std::sync::{Condvar, Mutex};

use crossbeam_queue::ArrayQueue;

/// A bounded queue whose consumer can block until an item is pushed
/// or the queue is closed.
pub struct BlockingQueue<T> {
    items: ArrayQueue<T>,
    signal: Mutex<bool>,
    condvar: Condvar,
    closed: std::sync::atomic::AtomicBool,
}

impl<T> BlockingQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: ArrayQueue::new(capacity.max(1)),
            signal: Mutex::new(false),
            condvar: Condvar::new(),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Pushes an item, waking one blocked consumer. Returns the item
    /// back on failure (queue full) so the caller can decide how to
    /// apply backpressure.
    pub fn push(&self, item: T) -> Result<(), T> {
        self.items.push(item)?;
        let mut guard = self.signal.lock().unwrap();
        *guard = true;
        self.condvar.notify_one();
        Ok(())
    }

    /// Blocks until an item is available or the queue is closed.
    pub fn pop(&self) -> Option<T> {
        loop {
            if let Some(item) = self.items.pop() {
                return Some(item);
            }
            if self.closed.load(std::sync::atomic::Ordering::Acquire) {
                return None;
            }
            let guard = self.signal.lock().unwrap();
            if *guard || self.closed.load(std::sync::atomic::Ordering::Acquire) {
                continue;
            }
            let (mut guard, _) =
                self.condvar.wait_timeout(guard, std::time::Duration::from_millis(200)).unwrap();
            *guard = false;
        }
    }

    /// Signals shutdown: every blocked `pop` wakes and returns `None`
    /// once drained, matching spec.md §4.F's continue-flag semantics.
    pub fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
        let mut guard = self.signal.lock().unwrap();
        *guard = true;
        self.condvar.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn push_then_pop_returns_item() {
        let queue = BlockingQueue::new(4);
        queue.push(42).unwrap();
        assert_eq!(queue.pop(), Some(42));
    }

    #[test]
    fn pop_blocks_until_pushed() {
        let queue = Arc::new(BlockingQueue::new(4));
        let producer = Arc::clone(&queue);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            producer.push(7).unwrap();
        });
        assert_eq!(queue.pop(), Some(7));
        handle.join().unwrap();
    }

    #[test]
    fn close_wakes_blocked_consumer_with_none() {
        let queue = Arc::new(BlockingQueue::<i32>::new(4));
        let closer = Arc::clone(&queue);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            closer.close();
        });
        assert_eq!(queue.pop(), None);
        handle.join().unwrap();
    }

    #[test]
    fn push_fails_when_full() {
        let queue = BlockingQueue::new(1);
        queue.push(1).unwrap();
        assert_eq!(queue.push(2), Err(2));
    }
}
