//! Bounded worker pool for background jobs.
//!
//! A fixed number of worker tasks pull jobs from a bounded queue, so at most
//! `max_workers` jobs run at once and at most `queue_capacity` wait. Jobs are
//! fire-and-forget: submitting to a full queue drops the job, and shutdown
//! either drains the queue or discards it.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{RangeCacheError, Result};

type Job = BoxFuture<'static, ()>;

/// What to do with queued jobs on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Run every queued job, then stop.
    Drain,
    /// Abort running jobs and drop queued ones.
    Discard,
}

/// Pool statistics.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub total_submitted: AtomicUsize,
    pub total_completed: AtomicUsize,
    pub total_rejected: AtomicUsize,
    pub total_panicked: AtomicUsize,
}

/// Counts queued plus running jobs and wakes idle waiters at zero.
#[derive(Debug, Default)]
struct Outstanding {
    count: AtomicUsize,
    idle: Notify,
}

impl Outstanding {
    fn add(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        // Saturating: a discard may have reset the count under a finishing job.
        let previous = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.idle.notify_waiters();
        }
    }

    fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
        self.idle.notify_waiters();
    }
}

pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    outstanding: Arc<Outstanding>,
    stats: Arc<PoolStats>,
    max_workers: usize,
}

impl WorkerPool {
    /// Start `max_workers` workers on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(max_workers: usize, queue_capacity: usize) -> Self {
        let max_workers = max_workers.max(1);
        let (tx, rx) = mpsc::channel::<Job>(queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let outstanding = Arc::new(Outstanding::default());
        let stats = Arc::new(PoolStats::default());

        let workers = (0..max_workers)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let outstanding = Arc::clone(&outstanding);
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    loop {
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else {
                            break;
                        };
                        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                            stats.total_panicked.fetch_add(1, Ordering::Relaxed);
                            warn!(worker_id, "Background job panicked");
                        }
                        stats.total_completed.fetch_add(1, Ordering::Relaxed);
                        outstanding.done();
                    }
                    debug!(worker_id, "Worker stopped");
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            outstanding,
            stats,
            max_workers,
        }
    }

    /// Queue `job`. Returns `Ok(false)` if the queue is full and the job was dropped.
    pub fn submit<F>(&self, job: F) -> Result<bool>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            return Err(RangeCacheError::ShutDown);
        };

        self.outstanding.add();
        match sender.try_send(job.boxed()) {
            Ok(()) => {
                self.stats.total_submitted.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.outstanding.done();
                self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.outstanding.done();
                Err(RangeCacheError::ShutDown)
            }
        }
    }

    /// Wait until no job is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.outstanding.idle.notified();
            if self.outstanding.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Number of jobs queued or running.
    pub fn outstanding(&self) -> usize {
        self.outstanding.count.load(Ordering::SeqCst)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stop accepting jobs and stop the workers.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        let sender = self.sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock());
        match mode {
            ShutdownMode::Drain => {
                for handle in workers {
                    if let Err(e) = handle.await {
                        warn!("Worker failed during shutdown: {e}");
                    }
                }
            }
            ShutdownMode::Discard => {
                for handle in &workers {
                    handle.abort();
                }
                self.outstanding.reset();
            }
        }

        info!(
            ?mode,
            completed = self.stats.total_completed.load(Ordering::Relaxed),
            rejected = self.stats.total_rejected.load(Ordering::Relaxed),
            "Worker pool shut down"
        );
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for handle in self.workers.get_mut().iter() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_jobs_run_and_pool_goes_idle() {
        let pool = WorkerPool::new(2, 16);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            assert!(pool
                .submit(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap());
        }

        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_job() {
        let pool = WorkerPool::new(1, 1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        // Occupy the only worker.
        pool.submit(async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
        })
        .unwrap();
        started_rx.await.unwrap();

        // One job fits in the queue, the next is dropped.
        assert!(pool.submit(async {}).unwrap());
        assert!(!pool.submit(async {}).unwrap());
        assert_eq!(pool.stats().total_rejected.load(Ordering::Relaxed), 1);

        release_tx.send(()).unwrap();
        pool.wait_idle().await;
    }

    #[tokio::test]
    async fn test_drain_runs_queued_jobs() {
        let pool = WorkerPool::new(1, 8);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown(ShutdownMode::Drain).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert!(matches!(
            pool.submit(async {}),
            Err(RangeCacheError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn test_discard_does_not_wait() {
        let pool = WorkerPool::new(1, 8);
        pool.submit(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
        .unwrap();

        pool.shutdown(ShutdownMode::Discard).await;
        assert!(pool.is_shut_down());
        pool.wait_idle().await;
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1, 4);
        pool.submit(async {
            panic!("boom");
        })
        .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        pool.submit(async move {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().total_panicked.load(Ordering::Relaxed), 1);
    }
}
