use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use pzip_core::{PzipError, WorkQueue};

#[test]
fn every_task_is_popped_exactly_once() -> Result<(), Box<dyn std::error::Error>> {
    let queue = Arc::new(WorkQueue::new());
    let seen = Arc::new(AtomicUsize::new(0));
    let sum = Arc::new(AtomicUsize::new(0));

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let seen = Arc::clone(&seen);
            let sum = Arc::clone(&sum);
            thread::spawn(move || {
                while let Some(task) = queue.pop() {
                    seen.fetch_add(1, Ordering::Relaxed);
                    sum.fetch_add(task, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for task in 1..=1000usize {
        queue.push(task)?;
    }
    queue.finish();

    for consumer in consumers {
        consumer
            .join()
            .map_err(|_| std::io::Error::other("consumer panicked"))?;
    }
    assert_eq!(seen.load(Ordering::Relaxed), 1000);
    assert_eq!(sum.load(Ordering::Relaxed), 1000 * 1001 / 2);
    assert!(queue.is_empty());
    Ok(())
}

#[test]
fn pop_preserves_fifo_order() -> Result<(), Box<dyn std::error::Error>> {
    let queue = WorkQueue::new();
    for task in 0..5 {
        queue.push(task)?;
    }
    queue.finish();
    let drained: Vec<i32> = std::iter::from_fn(|| queue.pop()).collect();
    assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    assert_eq!(queue.pop(), None);
    Ok(())
}

#[test]
fn finish_wakes_blocked_poppers() -> Result<(), Box<dyn std::error::Error>> {
    let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new());
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    queue.finish();
    for waiter in waiters {
        let popped = waiter
            .join()
            .map_err(|_| std::io::Error::other("waiter panicked"))?;
        assert_eq!(popped, None);
    }
    Ok(())
}

#[test]
fn bounded_push_blocks_until_space() -> Result<(), Box<dyn std::error::Error>> {
    let queue = Arc::new(WorkQueue::with_capacity_limit(Some(2)));
    let pushed = Arc::new(AtomicUsize::new(0));

    let producer = {
        let queue = Arc::clone(&queue);
        let pushed = Arc::clone(&pushed);
        thread::spawn(move || -> Result<(), PzipError> {
            for task in 0..5u32 {
                queue.push(task)?;
                pushed.fetch_add(1, Ordering::AcqRel);
            }
            queue.finish();
            Ok(())
        })
    };

    thread::sleep(Duration::from_millis(30));
    assert_eq!(pushed.load(Ordering::Acquire), 2);
    assert!(queue.len() <= 2);

    let mut drained = Vec::new();
    while let Some(task) = queue.pop() {
        drained.push(task);
    }
    producer
        .join()
        .map_err(|_| std::io::Error::other("producer panicked"))??;
    assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    Ok(())
}

#[test]
fn close_discards_pending_work_and_rejects_pushes() -> Result<(), Box<dyn std::error::Error>> {
    let queue = WorkQueue::new();
    queue.push(1u8)?;
    queue.push(2u8)?;
    queue.close();

    assert!(queue.is_empty());
    assert_eq!(queue.pop(), None);
    assert!(matches!(queue.push(3u8), Err(PzipError::Aborted)));
    Ok(())
}

#[test]
fn push_after_finish_is_rejected() {
    let queue = WorkQueue::new();
    queue.finish();
    assert!(queue.is_finished());
    assert!(matches!(
        queue.push(1u8),
        Err(PzipError::ProtocolViolation(_))
    ));
}
