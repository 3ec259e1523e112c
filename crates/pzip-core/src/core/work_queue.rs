use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::PzipError;
use crate::types::Result;

#[derive(Debug)]
struct QueueState<T> {
    tasks: VecDeque<T>,
    finished: bool,
    closed: bool,
}

/// FIFO of tasks shared by one producer and many consumers.
///
/// `pop` blocks while the queue is empty and production is still running.
/// After [`WorkQueue::finish`] the remaining tasks drain normally and every
/// further `pop` returns `None`. [`WorkQueue::close`] drops queued tasks and
/// releases every blocked producer and consumer at once.
#[derive(Debug)]
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
    space: Condvar,
    capacity: Option<usize>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    /// Creates an unbounded queue.
    pub fn new() -> Self {
        Self::with_capacity_limit(None)
    }

    /// Creates a queue whose `push` blocks once `capacity` tasks are waiting.
    /// `None` leaves it unbounded.
    pub fn with_capacity_limit(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                finished: false,
                closed: false,
            }),
            available: Condvar::new(),
            space: Condvar::new(),
            capacity: capacity.map(|limit| limit.max(1)),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Appends a task and wakes one waiting consumer.
    ///
    /// # Errors
    /// [`PzipError::Aborted`] once the queue is closed,
    /// [`PzipError::ProtocolViolation`] after `finish`, and
    /// [`PzipError::Allocation`] if the queue cannot grow.
    pub fn push(&self, task: T) -> Result<()> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(PzipError::Aborted);
            }
            if state.finished {
                return Err(PzipError::ProtocolViolation(
                    "task pushed after the queue was finished".to_string(),
                ));
            }
            match self.capacity {
                Some(limit) if state.tasks.len() >= limit => {
                    state = wait(&self.space, state);
                }
                _ => break,
            }
        }

        state.tasks.try_reserve(1)?;
        state.tasks.push_back(task);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Takes the oldest task, blocking while none is available.
    ///
    /// Returns `None` once production is finished and the queue is drained,
    /// or as soon as the queue is closed.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(task) = state.tasks.pop_front() {
                drop(state);
                if self.capacity.is_some() {
                    self.space.notify_one();
                }
                return Some(task);
            }
            if state.finished {
                return None;
            }
            state = wait(&self.available, state);
        }
    }

    /// Marks production as complete and wakes every consumer.
    pub fn finish(&self) {
        let mut state = self.lock();
        state.finished = true;
        drop(state);
        self.available.notify_all();
    }

    /// Discards all queued tasks and releases every waiter.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        let dropped = std::mem::take(&mut state.tasks);
        drop(state);
        drop(dropped);
        self.available.notify_all();
        self.space.notify_all();
    }

    /// Tasks currently waiting.
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn wait<'a, S>(condvar: &Condvar, guard: MutexGuard<'a, S>) -> MutexGuard<'a, S> {
    match condvar.wait(guard) {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::WorkQueue;

    #[test]
    fn drains_then_reports_end_of_work() {
        let queue = WorkQueue::new();
        queue.push(1).expect("push");
        queue.push(2).expect("push");
        queue.finish();

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.pop(), None);
        assert!(queue.push(3).is_err());
    }

    #[test]
    fn close_discards_pending_tasks() {
        let queue = WorkQueue::new();
        queue.push("a").expect("push");
        queue.close();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }
}
