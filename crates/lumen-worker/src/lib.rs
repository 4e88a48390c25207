//! Lumen Worker – in-process ingestion queue and worker pool.
//!
//! This crate provides the FIFO ingestion queue with a bounded number of concurrent
//! workers and the `JobHandler` trait. The services crate implements the trait with the
//! upload pipeline; the queue only schedules, isolates failures and reports depth.

mod handler;
mod queue;

pub use handler::JobHandler;
pub use queue::{IngestQueue, IngestQueueConfig, QueueStats, ShutdownReport};
