//! Background job processing: queue, workers and the submission service

mod backend;
mod job_queue;
mod pool;
mod service;
mod worker;


pub use backend::Backend;
pub use job_queue::{ClaimedJob, JobQueue, Lease, QueueStats};
pub use pool::{ReapSummary, Reaper, WorkerPool};
pub use service::JobService;
pub use worker::{HandleOutcome, Worker};
