//! Worker pool for block compression and decompression.
//!
//! The pool owns a fixed set of threads fed through a bounded queue. Once the
//! queue is full, [`WorkerPool::execute`] blocks the submitting thread, so a
//! fast producer can never buffer an unbounded amount of work. Submission is
//! safe from any number of threads; one pool is typically wrapped in an
//! [`Arc`](std::sync::Arc) and attached to several readers and writers.
//!
//! Record-level work (index building, pileup) stays single threaded. Rayon is
//! used only for embarrassingly parallel per-reference steps such as index
//! finalization.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;

use crate::error::{BrixError, Result};

/// Minimum number of references before index finalization fans out to rayon.
pub const PARALLEL_THRESHOLD: usize = 4;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker threads with a bounded task queue.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    queue_size: usize,
}

impl WorkerPool {
    /// Spawn `threads` workers sharing a queue of `queue_size` pending tasks.
    ///
    /// A `queue_size` of zero is raised to one.
    pub fn new(threads: usize, queue_size: usize) -> Result<Self> {
        if threads == 0 {
            return Err(BrixError::InvalidArgument(
                "worker pool needs at least one thread".to_string(),
            ));
        }
        let queue_size = queue_size.max(1);
        let (sender, receiver) = bounded::<Job>(queue_size);

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("brix-worker-{}", i))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                })?;
            workers.push(handle);
        }
        debug!(
            "started worker pool: {} threads, queue of {}",
            threads, queue_size
        );

        Ok(Self {
            sender: Some(sender),
            workers,
            queue_size,
        })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Capacity of the task queue.
    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    /// Queue a task, blocking while the queue is full.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| BrixError::Compression("worker pool is shut down".to_string()))?;
        sender
            .send(Box::new(job))
            .map_err(|_| BrixError::Compression("worker pool is shut down".to_string()))
    }

    /// Queue a task producing a value and return a handle to its result.
    ///
    /// Blocks while the queue is full, like [`execute`](Self::execute).
    pub fn submit<T, F>(&self, task: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        self.execute(move || {
            let _ = tx.send(task());
        })?;
        Ok(TaskHandle { receiver: rx })
    }
}

/// Result of a task queued with [`WorkerPool::submit`].
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block until the task has run.
    ///
    /// Fails if the task panicked or the pool shut down before running it.
    pub fn wait(self) -> Result<T> {
        self.receiver
            .recv()
            .map_err(|_| BrixError::Compression("worker task did not complete".to_string()))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel ends every worker loop once the queue drains.
        self.sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.workers.len())
            .field("queue_size", &self.queue_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_runs_every_job() {
        let pool = WorkerPool::new(3, 2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = unbounded();
        for i in 0..100 {
            let counter = Arc::clone(&counter);
            let tx = tx.clone();
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                tx.send(i).unwrap();
            })
            .unwrap();
        }
        drop(tx);
        let mut seen: Vec<i32> = rx.iter().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_shared_between_threads() {
        let pool = Arc::new(WorkerPool::new(2, 1).unwrap());
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..25 {
                        let counter = Arc::clone(&counter);
                        pool.execute(move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // Dropping the pool waits for the queue to drain.
        drop(Arc::try_unwrap(pool).unwrap());
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_submit_returns_result() {
        let pool = WorkerPool::new(2, 4).unwrap();
        let handles: Vec<_> = (0..10u64)
            .map(|i| pool.submit(move || i * i).unwrap())
            .collect();
        let squares: Vec<u64> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
        assert_eq!(squares[9], 81);
        assert_eq!(squares.iter().sum::<u64>(), 285);
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(WorkerPool::new(0, 4).is_err());
    }
}
