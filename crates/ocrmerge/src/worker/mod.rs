pub mod job;
pub mod pool;

pub use job::{ExtractionJob, JobResult};
pub use pool::WorkerPool;

// Re-export crossbeam_channel for callers wiring their own queues
pub use crossbeam_channel;
