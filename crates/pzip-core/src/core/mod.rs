pub mod ordering;
pub mod work_queue;
pub mod worker_pool;

pub use ordering::{OrderingCoordinator, TurnToken};
pub use work_queue::WorkQueue;
pub use worker_pool::{PoolRuntimeSnapshot, WorkerPool, WorkerRuntimeSnapshot, panic_message};
