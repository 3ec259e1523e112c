use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pzip_core::{PzipError, WorkQueue, WorkerPool, WorkerTelemetry};

#[derive(Default)]
struct CountingTelemetry {
    started: AtomicUsize,
    finished: AtomicUsize,
    failed: AtomicUsize,
    turn_waits: Mutex<Vec<Duration>>,
}

impl WorkerTelemetry for CountingTelemetry {
    fn on_queue_depth(&self, _worker_id: usize, _depth: usize) {}

    fn on_task_started(&self, _worker_id: usize, _task_kind: &str) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn on_task_finished(&self, _worker_id: usize, _task_kind: &str, _elapsed: Duration) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    fn on_task_failed(&self, _worker_id: usize, _task_kind: &str, _elapsed: Duration) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn on_turn_wait(&self, _worker_id: usize, waited: Duration) {
        self.turn_waits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(waited);
    }
}

#[test]
fn workers_drain_the_queue() -> Result<(), Box<dyn std::error::Error>> {
    let telemetry = Arc::new(CountingTelemetry::default());
    let pool = WorkerPool::with_telemetry(3, telemetry.clone());
    let queue = WorkQueue::new();
    for task in 0..90u32 {
        queue.push(task)?;
    }
    queue.finish();

    let total = AtomicUsize::new(0);
    thread::scope(|scope| {
        for worker_id in 0..pool.num_workers() {
            let (pool, queue, total) = (&pool, &queue, &total);
            scope.spawn(move || {
                pool.run_worker(worker_id, queue, |task| {
                    total.fetch_add(task as usize, Ordering::Relaxed);
                    Ok(())
                })
            });
        }
    });

    assert_eq!(total.load(Ordering::Relaxed), (0..90).sum::<usize>());
    assert_eq!(pool.completed_count(), 90);
    assert_eq!(telemetry.started.load(Ordering::Relaxed), 90);
    assert_eq!(telemetry.finished.load(Ordering::Relaxed), 90);

    let snapshot = pool.runtime_snapshot(0);
    assert_eq!(snapshot.workers.len(), 3);
    assert_eq!(
        snapshot
            .workers
            .iter()
            .map(|worker| worker.tasks_completed)
            .sum::<usize>(),
        90
    );
    assert!(
        snapshot
            .workers
            .iter()
            .all(|worker| (0.0..=1.0).contains(&worker.utilization))
    );
    Ok(())
}

#[test]
fn first_error_stops_the_worker() -> Result<(), Box<dyn std::error::Error>> {
    let telemetry = Arc::new(CountingTelemetry::default());
    let pool = WorkerPool::with_telemetry(1, telemetry.clone());
    let queue = WorkQueue::new();
    for task in 0..5u32 {
        queue.push(task)?;
    }
    queue.finish();

    let outcome = pool.run_worker(0, &queue, |task| {
        if task == 2 {
            Err(PzipError::InvalidFormat("bad page"))
        } else {
            Ok(())
        }
    });

    assert!(matches!(outcome, Err(PzipError::InvalidFormat("bad page"))));
    assert_eq!(pool.completed_count(), 2);
    assert_eq!(telemetry.failed.load(Ordering::Relaxed), 1);
    assert_eq!(queue.len(), 2);
    Ok(())
}

#[test]
fn panics_become_worker_errors() -> Result<(), Box<dyn std::error::Error>> {
    let pool = WorkerPool::new(1);
    let queue = WorkQueue::new();
    queue.push("boom")?;
    queue.finish();

    let outcome = pool.run_worker(0, &queue, |message| -> pzip_core::Result<()> {
        panic!("{message}");
    });
    match outcome {
        Err(PzipError::Worker(message)) => assert!(message.contains("boom")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    Ok(())
}

#[test]
fn turn_waits_are_tracked_per_worker() {
    let telemetry = Arc::new(CountingTelemetry::default());
    let pool = WorkerPool::with_telemetry(2, telemetry.clone());
    pool.record_turn_wait(1, Duration::from_millis(3));
    pool.record_turn_wait(1, Duration::from_millis(2));

    let snapshot = pool.runtime_snapshot(4);
    assert_eq!(snapshot.pending, 4);
    assert_eq!(snapshot.workers[0].turn_wait, Duration::ZERO);
    assert_eq!(snapshot.workers[1].turn_wait, Duration::from_millis(5));
    assert_eq!(
        telemetry
            .turn_waits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len(),
        2
    );
}
