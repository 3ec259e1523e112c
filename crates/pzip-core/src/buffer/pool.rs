use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};

use crate::telemetry;
#[cfg(feature = "profiling")]
use crate::telemetry::profile;
use crate::telemetry::tags;
use crate::types::{Result, Run, duration_to_us};

#[cfg(feature = "profiling")]
const PROFILE_TAG_STACK_BUFFER: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_BUFFER];

/// A pool of reusable run buffers.
///
/// Workers compress every page into a buffer taken from the pool; once the
/// page has been merged into the result sequence the buffer is dropped and
/// goes back to the pool, so steady-state encoding does not allocate per page.
///
/// # Example
/// ```
/// use pzip_core::RunBufferPool;
///
/// let pool = RunBufferPool::new(4096, 16);
/// let runs = pool.acquire()?;
/// // fill runs...
/// drop(runs); // returns to pool automatically
/// # Ok::<(), pzip_core::PzipError>(())
/// ```
#[derive(Debug)]
pub struct RunBufferPool {
    recycler: Sender<Vec<Run>>,
    receiver: Receiver<Vec<Run>>,
    default_capacity: usize,
    max_buffers: usize,
    metrics: Arc<PoolMetricsInner>,
}

impl RunBufferPool {
    /// Creates a new pool.
    ///
    /// # Arguments
    /// * `default_capacity` - Runs reserved in every newly created buffer
    /// * `max_buffers` - Maximum number of idle buffers kept for reuse
    pub fn new(default_capacity: usize, max_buffers: usize) -> Self {
        let max_buffers = max_buffers.max(1);
        let (tx, rx) = bounded(max_buffers);
        Self {
            recycler: tx,
            receiver: rx,
            default_capacity,
            max_buffers,
            metrics: Arc::new(PoolMetricsInner::default()),
        }
    }

    /// Acquires an empty buffer, recycled when one is idle.
    ///
    /// # Errors
    /// Returns [`PzipError::Allocation`](crate::PzipError::Allocation) when a
    /// fresh buffer cannot reserve its default capacity.
    pub fn acquire(&self) -> Result<PooledRuns> {
        let started_at = Instant::now();
        let (result, buffer) = match self.receiver.try_recv() {
            Ok(mut buffer) => {
                buffer.clear();
                self.metrics.recycled.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(
                    tags::METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT,
                    1,
                    &[
                        ("subsystem", "buffer"),
                        ("op", "acquire"),
                        ("result", "recycled"),
                    ],
                );
                telemetry::sub_gauge_saturating(
                    tags::METRIC_MEMORY_POOL_ESTIMATED_BYTES,
                    run_bytes(buffer.capacity()),
                    &[("subsystem", "buffer"), ("op", "acquire")],
                );
                ("recycled", buffer)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                let mut buffer = Vec::new();
                buffer.try_reserve(self.default_capacity)?;
                self.metrics.created.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(
                    tags::METRIC_BUFFER_ACQUIRE_CREATED_COUNT,
                    1,
                    &[
                        ("subsystem", "buffer"),
                        ("op", "acquire"),
                        ("result", "created"),
                    ],
                );
                ("created", buffer)
            }
        };
        let elapsed_us = duration_to_us(started_at.elapsed());
        telemetry::record_histogram(
            tags::METRIC_BUFFER_ACQUIRE_LATENCY_US,
            elapsed_us,
            &[("subsystem", "buffer"), ("op", "acquire")],
        );
        #[cfg(not(feature = "profiling"))]
        let _ = result;
        #[cfg(feature = "profiling")]
        profile::event(
            tags::PROFILE_BUFFER,
            &PROFILE_TAG_STACK_BUFFER,
            "acquire",
            result,
            elapsed_us,
            "run buffer acquire completed",
        );

        Ok(PooledRuns {
            buffer,
            recycler: Some(self.recycler.clone()),
            metrics: Some(Arc::clone(&self.metrics)),
        })
    }

    /// Returns a snapshot of the current pool metrics.
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            created: self.metrics.created.load(Ordering::Relaxed),
            recycled: self.metrics.recycled.load(Ordering::Relaxed),
            dropped: self.metrics.dropped.load(Ordering::Relaxed),
        }
    }

    /// Runs reserved in every newly created buffer.
    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    /// Maximum number of idle buffers the pool keeps.
    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }
}

fn run_bytes(capacity: usize) -> u64 {
    capacity.saturating_mul(std::mem::size_of::<Run>()) as u64
}

/// A snapshot of buffer pool metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolMetricsSnapshot {
    /// Number of buffers created by the pool
    pub created: usize,
    /// Number of buffers handed out again after being returned
    pub recycled: usize,
    /// Number of buffers dropped because the pool was full
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct PoolMetricsInner {
    created: AtomicUsize,
    recycled: AtomicUsize,
    dropped: AtomicUsize,
}

/// A run buffer, optionally owned by a [`RunBufferPool`].
///
/// Dereferences to `Vec<Run>`. Pool-owned buffers go back to their pool on
/// drop; detached buffers are simply freed.
#[derive(Debug)]
pub struct PooledRuns {
    buffer: Vec<Run>,
    recycler: Option<Sender<Vec<Run>>>,
    metrics: Option<Arc<PoolMetricsInner>>,
}

impl PooledRuns {
    /// Wraps a plain vector that is not tied to any pool.
    pub fn detached(buffer: Vec<Run>) -> Self {
        Self {
            buffer,
            recycler: None,
            metrics: None,
        }
    }

    pub fn as_slice(&self) -> &[Run] {
        &self.buffer
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<Run> {
        &mut self.buffer
    }
}

impl Deref for PooledRuns {
    type Target = Vec<Run>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledRuns {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledRuns {
    fn drop(&mut self) {
        let Some(recycler) = self.recycler.take() else {
            return;
        };

        let started_at = Instant::now();
        let buffer = std::mem::take(&mut self.buffer);
        let capacity = buffer.capacity();
        let recycled = match recycler.try_send(buffer) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        };

        if recycled {
            telemetry::increment_counter(
                tags::METRIC_BUFFER_RECYCLE_OK_COUNT,
                1,
                &[
                    ("subsystem", "buffer"),
                    ("op", "recycle"),
                    ("result", "recycled"),
                ],
            );
            telemetry::add_gauge(
                tags::METRIC_MEMORY_POOL_ESTIMATED_BYTES,
                run_bytes(capacity),
                &[("subsystem", "buffer"), ("op", "recycle")],
            );
        } else {
            if let Some(metrics) = &self.metrics {
                metrics.dropped.fetch_add(1, Ordering::Relaxed);
            }
            telemetry::increment_counter(
                tags::METRIC_BUFFER_RECYCLE_DROPPED_COUNT,
                1,
                &[
                    ("subsystem", "buffer"),
                    ("op", "recycle"),
                    ("result", "dropped"),
                ],
            );
        }

        let elapsed_us = duration_to_us(started_at.elapsed());
        telemetry::record_histogram(
            tags::METRIC_BUFFER_RECYCLE_LATENCY_US,
            elapsed_us,
            &[("subsystem", "buffer"), ("op", "recycle")],
        );
        #[cfg(feature = "profiling")]
        profile::event(
            tags::PROFILE_BUFFER,
            &PROFILE_TAG_STACK_BUFFER,
            "recycle",
            if recycled { "recycled" } else { "dropped" },
            elapsed_us,
            "run buffer released",
        );
    }
}
