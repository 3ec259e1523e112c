use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::PzipError;
use crate::core::WorkQueue;
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::types::{Result, duration_to_us};

/// Runtime bookkeeping for a fixed set of workers.
///
/// The pool does not own threads: callers spawn one thread per worker id
/// (usually inside `std::thread::scope`) and drive it through
/// [`WorkerPool::run_worker`], which pulls tasks from a [`WorkQueue`] and
/// records per-worker timings for [`WorkerPool::runtime_snapshot`].
pub struct WorkerPool {
    num_workers: usize,
    telemetry: Arc<dyn WorkerTelemetry>,
    started_at: Instant,
    completed: AtomicUsize,
    task_counts: Vec<AtomicUsize>,
    worker_started_offsets_us: Vec<AtomicU64>,
    worker_stopped_offsets_us: Vec<AtomicU64>,
    worker_busy_us: Vec<AtomicU64>,
    worker_turn_wait_us: Vec<AtomicU64>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_workers", &self.num_workers)
            .field("completed", &self.completed_count())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Creates a pool using the default worker telemetry implementation.
    pub fn new(num_workers: usize) -> Self {
        Self::with_telemetry(num_workers, Arc::new(DefaultWorkerTelemetry))
    }

    /// Creates a pool with a custom telemetry backend.
    pub fn with_telemetry(num_workers: usize, telemetry: Arc<dyn WorkerTelemetry>) -> Self {
        let workers = num_workers.max(1);
        let counters = || (0..workers).map(|_| AtomicU64::new(0)).collect::<Vec<_>>();
        Self {
            num_workers: workers,
            telemetry,
            started_at: Instant::now(),
            completed: AtomicUsize::new(0),
            task_counts: (0..workers).map(|_| AtomicUsize::new(0)).collect(),
            worker_started_offsets_us: counters(),
            worker_stopped_offsets_us: counters(),
            worker_busy_us: counters(),
            worker_turn_wait_us: counters(),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Tasks completed by all workers so far.
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Runs worker `worker_id` until the queue reports end of work.
    ///
    /// Each task goes through `process`; a panic inside it is caught and
    /// turned into [`PzipError::Worker`]. The first failing task ends the
    /// loop and its error is returned.
    pub fn run_worker<T, F>(&self, worker_id: usize, queue: &WorkQueue<T>, mut process: F) -> Result<()>
    where
        F: FnMut(T) -> Result<()>,
    {
        let worker_id = worker_id.min(self.num_workers - 1);
        self.mark(&self.worker_started_offsets_us[worker_id]);

        let outcome = loop {
            let Some(task) = queue.pop() else {
                break Ok(());
            };

            self.telemetry.on_queue_depth(worker_id, queue.len());
            self.telemetry.on_task_started(worker_id, "page");
            let started_at = Instant::now();

            let result = match catch_unwind(AssertUnwindSafe(|| process(task))) {
                Ok(result) => result,
                Err(payload) => Err(PzipError::Worker(format!(
                    "worker {worker_id} panicked: {}",
                    panic_message(payload.as_ref())
                ))),
            };

            let elapsed = started_at.elapsed();
            self.worker_busy_us[worker_id].fetch_add(duration_to_us(elapsed), Ordering::AcqRel);
            match &result {
                Ok(()) => self.telemetry.on_task_finished(worker_id, "page", elapsed),
                Err(_) => self.telemetry.on_task_failed(worker_id, "page", elapsed),
            }

            if let Err(error) = result {
                break Err(error);
            }
            self.completed.fetch_add(1, Ordering::AcqRel);
            self.task_counts[worker_id].fetch_add(1, Ordering::AcqRel);
        };

        self.mark(&self.worker_stopped_offsets_us[worker_id]);
        outcome
    }

    /// Records time a worker spent waiting for its merge turn.
    pub fn record_turn_wait(&self, worker_id: usize, waited: Duration) {
        let worker_id = worker_id.min(self.num_workers - 1);
        self.worker_turn_wait_us[worker_id].fetch_add(duration_to_us(waited), Ordering::AcqRel);
        self.telemetry.on_turn_wait(worker_id, waited);
    }

    /// Returns runtime metrics for the pool and each worker.
    pub fn runtime_snapshot(&self, pending: usize) -> PoolRuntimeSnapshot {
        let elapsed = self.started_at.elapsed();
        let elapsed_us = duration_to_us(elapsed);

        let workers = (0..self.num_workers)
            .map(|worker_id| {
                let started_raw = self.worker_started_offsets_us[worker_id].load(Ordering::Acquire);
                let stopped_raw = self.worker_stopped_offsets_us[worker_id].load(Ordering::Acquire);

                // Offsets are stored +1 so that zero means "not yet".
                let start_us = started_raw.saturating_sub(1);
                let stop_us = if stopped_raw == 0 {
                    elapsed_us
                } else {
                    stopped_raw.saturating_sub(1)
                };
                let uptime_us = if started_raw == 0 {
                    0
                } else {
                    stop_us.saturating_sub(start_us)
                };
                let busy_us = self.worker_busy_us[worker_id]
                    .load(Ordering::Acquire)
                    .min(uptime_us);
                let utilization = if uptime_us == 0 {
                    0.0
                } else {
                    busy_us as f64 / uptime_us as f64
                };

                WorkerRuntimeSnapshot {
                    worker_id,
                    tasks_completed: self.task_counts[worker_id].load(Ordering::Acquire),
                    uptime: Duration::from_micros(uptime_us),
                    busy: Duration::from_micros(busy_us),
                    idle: Duration::from_micros(uptime_us.saturating_sub(busy_us)),
                    utilization,
                    turn_wait: Duration::from_micros(
                        self.worker_turn_wait_us[worker_id].load(Ordering::Acquire),
                    ),
                }
            })
            .collect();

        PoolRuntimeSnapshot {
            elapsed,
            completed: self.completed_count(),
            pending,
            workers,
        }
    }

    fn mark(&self, slot: &AtomicU64) {
        let offset = duration_to_us(self.started_at.elapsed());
        slot.store(offset.saturating_add(1), Ordering::Release);
    }
}

/// Per-worker runtime metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRuntimeSnapshot {
    pub worker_id: usize,
    pub tasks_completed: usize,
    pub uptime: Duration,
    pub busy: Duration,
    pub idle: Duration,
    pub utilization: f64,
    pub turn_wait: Duration,
}

/// Runtime metrics snapshot for the worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRuntimeSnapshot {
    pub elapsed: Duration,
    pub completed: usize,
    pub pending: usize,
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panicking_task_becomes_worker_error() {
        let pool = WorkerPool::new(1);
        let queue = WorkQueue::new();
        queue.push(1u32).expect("push");
        queue.finish();

        let result = pool.run_worker(0, &queue, |_task| -> Result<()> { panic!("boom") });
        match result {
            Err(PzipError::Worker(message)) => assert!(message.contains("boom")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(pool.completed_count(), 0);
    }

    #[test]
    fn counts_completed_tasks_per_worker() {
        let pool = WorkerPool::new(2);
        let queue = WorkQueue::new();
        for task in 0..5u32 {
            queue.push(task).expect("push");
        }
        queue.finish();

        let mut seen = Vec::new();
        pool.run_worker(1, &queue, |task| {
            seen.push(task);
            Ok(())
        })
        .expect("worker");

        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        let snapshot = pool.runtime_snapshot(0);
        assert_eq!(snapshot.completed, 5);
        assert_eq!(snapshot.workers[1].tasks_completed, 5);
        assert_eq!(snapshot.workers[0].tasks_completed, 0);
    }
}
