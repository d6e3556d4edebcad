//! Background task execution
//!
//! Render jobs run on a small pool of worker threads pulling from a shared
//! queue. Each submitted job gets a [`TaskHandle`]: cancelling it is best
//! effort (a job that has not started yet is skipped, a running job can check
//! its token), so results must also carry a staleness tag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

use flume::{Receiver, Sender};
use log::{debug, warn};

/// Default number of worker threads
pub const DEFAULT_WORKERS: usize = 3;

/// A unit of background work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where background jobs are sent. Injected into the viewer so tests can
/// run jobs deterministically.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Unique identifier for submitted tasks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

impl RequestId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Cooperative cancellation flag shared between the submitter and the job
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Submitter-side view of a queued or running job
#[derive(Clone, Debug)]
pub struct TaskHandle {
    id: RequestId,
    token: CancellationToken,
    done: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Request cancellation; a job that already started may still finish
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once the job ran to completion or was skipped
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Cancel unless already finished
    pub fn cancel_if_pending(&self) {
        if !self.is_done() {
            self.cancel();
        }
    }
}

struct DoneOnDrop(Arc<AtomicBool>);

impl Drop for DoneOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Submit `work` to `executor`, returning a handle that can cancel it
pub fn spawn<F>(executor: &dyn Executor, label: &'static str, work: F) -> TaskHandle
where
    F: FnOnce(&CancellationToken) + Send + 'static,
{
    let handle = TaskHandle {
        id: RequestId::next(),
        token: CancellationToken::new(),
        done: Arc::new(AtomicBool::new(false)),
    };

    let token = handle.token.clone();
    let done = DoneOnDrop(Arc::clone(&handle.done));
    let id = handle.id;
    executor.execute(Box::new(move || {
        // Marks the handle done even if `work` unwinds
        let _done = done;
        if token.is_cancelled() {
            debug!("Skipping cancelled {label} task {id:?}");
        } else {
            work(&token);
        }
    }));

    handle
}

enum PoolMessage {
    Run(Job),
    Shutdown,
}

/// Fixed-size pool of worker threads sharing one job queue
pub struct WorkerPool {
    queue: Sender<PoolMessage>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `num_workers` threads (at least one)
    #[must_use]
    pub fn new(num_workers: usize) -> Self {
        // flume gives MPMC: every worker clones the receiver and pulls from
        // the same queue.
        let (queue, jobs) = flume::unbounded();
        let workers = (0..num_workers.max(1))
            .filter_map(|n| {
                let jobs: Receiver<PoolMessage> = jobs.clone();
                std::thread::Builder::new()
                    .name(format!("pdfview-worker-{n}"))
                    .spawn(move || worker_loop(&jobs))
                    .map_err(|e| warn!("Failed to spawn worker thread {n}: {e}"))
                    .ok()
            })
            .collect();

        Self { queue, workers }
    }

    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop all workers after the jobs already queued
    pub fn shutdown(&mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.queue.send(PoolMessage::Shutdown);
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
    }
}

fn worker_loop(jobs: &Receiver<PoolMessage>) {
    for message in jobs.iter() {
        match message {
            PoolMessage::Run(job) => {
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
                    warn!("Background job panicked");
                }
            }
            PoolMessage::Shutdown => break,
        }
    }
}

impl Executor for WorkerPool {
    fn execute(&self, job: Job) {
        if self.queue.send(PoolMessage::Run(job)).is_err() {
            warn!("Worker pool is shut down; dropping job");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[test]
    fn pool_runs_jobs_on_workers() {
        let pool = WorkerPool::new(3);
        assert_eq!(pool.num_workers(), 3);
        let (tx, rx) = flume::unbounded();

        for i in 0..10 {
            let tx = tx.clone();
            spawn(&pool, "test", move |_| {
                let _ = tx.send(i);
            });
        }

        let mut seen: Vec<i32> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn cancelled_job_is_skipped_but_marked_done() {
        let pool = WorkerPool::new(1);
        let ran = Arc::new(AtomicUsize::new(0));
        let (gate_tx, gate_rx) = flume::bounded::<()>(0);

        // Block the single worker so the next job stays queued
        let blocker = spawn(&pool, "blocker", move |_| {
            let _ = gate_rx.recv();
        });

        let counter = Arc::clone(&ran);
        let queued = spawn(&pool, "queued", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        queued.cancel();
        gate_tx.send(()).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !(blocker.is_done() && queued.is_done()) {
            assert!(std::time::Instant::now() < deadline, "jobs did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1);
        spawn(&pool, "panic", |_| panic!("boom"));
        let (tx, rx) = flume::unbounded();
        spawn(&pool, "after", move |_| {
            let _ = tx.send(1);
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    }

    #[test]
    fn panicked_job_still_reports_done() {
        let pool = WorkerPool::new(1);
        let failed = spawn(&pool, "panic", |_| panic!("boom"));
        let (tx, rx) = flume::unbounded();
        spawn(&pool, "after", move |_| {
            let _ = tx.send(1);
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
        assert!(failed.is_done());
    }

    #[test]
    fn request_ids_are_unique() {
        let a = RequestId::next();
        let b = RequestId::next();
        assert_ne!(a, b);
    }
}
