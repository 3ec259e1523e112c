mod pool;

pub use pool::{PoolMetricsSnapshot, PooledRuns, RunBufferPool};
