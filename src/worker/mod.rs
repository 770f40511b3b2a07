//! Fixed-size pool of tokio tasks draining one job queue.

mod stats;

pub use stats::{RegistrarStats, StatsSnapshot};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the pending count when a job finishes, even if it panicked.
struct JobGuard<'a>(&'a Pending);

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Runs submitted jobs on `size` worker tasks. Jobs are taken in FIFO order
/// but may complete in any order.
pub struct WorkerPool<J> {
    sender: mpsc::UnboundedSender<J>,
    pending: Arc<Pending>,
    workers: Vec<JoinHandle<()>>,
}

impl<J: Send + 'static> WorkerPool<J> {
    pub fn new<F>(size: usize, handle: &Handle, handler: F) -> Self
    where
        F: Fn(J) + Send + Sync + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel::<J>();
        let receiver = Arc::new(Mutex::new(receiver));
        let handler = Arc::new(handler);
        let pending = Arc::new(Pending::default());

        let workers = (0..size.max(1))
            .map(|id| {
                let receiver = receiver.clone();
                let handler = handler.clone();
                let pending = pending.clone();
                handle.spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else { break };
                        let _guard = JobGuard(&pending);
                        handler(job);
                    }
                    tracing::trace!(worker = id, "worker stopped");
                })
            })
            .collect();

        WorkerPool {
            sender,
            pending,
            workers,
        }
    }

    /// Queues `job` without waiting. Returns `false` if the workers are gone.
    pub fn submit(&self, job: J) -> bool {
        self.pending.count.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(job).is_err() {
            self.pending.count.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::Acquire)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Resolves once every job submitted so far has finished.
    pub async fn settle(&self) {
        loop {
            let notified = self.pending.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl<J> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}
