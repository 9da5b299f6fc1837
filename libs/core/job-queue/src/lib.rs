//! Job Queue
//!
//! A durable, at-least-once job queue for background delivery work.
//!
//! ## Features
//!
//! - **Typed queue**: `JobQueue<P>` carries any `JobPayload`, serialized once at enqueue
//! - **Retry/backoff**: fixed or exponential per-job backoff, failed jobs parked for inspection
//! - **Bulk staggering**: `enqueue_bulk` spreads a batch out by 100ms per message
//! - **Operator controls**: status, pause/resume, drain, retry-failed
//! - **Atomic claim**: Redis Lua script, so several workers can share one queue
//! - **Prometheus metrics** and an axum admin router
//!
//! ## Example
//!
//! ```ignore
//! use job_queue::{JobQueue, QueueWorker, RedisQueueStore, WorkerConfig};
//!
//! let store = Arc::new(RedisQueueStore::new(redis, "notifications"));
//! let queue = JobQueue::<MyJob>::new(store);
//! queue.enqueue(&job).await?;
//!
//! let worker = QueueWorker::new(queue, processor, WorkerConfig::new().with_concurrency(5));
//! worker.run(shutdown_rx).await?;
//! ```

mod backoff;
mod clock;
mod config;
mod error;
mod health;
mod job;
mod memory;
pub mod metrics;
mod queue;
mod redis_store;
mod store;
mod worker;

pub use backoff::{BackoffKind, BackoffPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::WorkerConfig;
pub use error::{ErrorCategory, JobError, QueueError, QueueResult};
pub use health::{AdminState, HealthResponse, admin_router};
pub use job::{Job, JobId, JobOptions, JobPayload, JobStatus, NewJob, QueueCounts, StoredJob};
pub use memory::MemoryQueueStore;
pub use metrics::{QueueMetrics, init_metrics, render_metrics};
pub use queue::{BULK_STAGGER_MS, DEFAULT_LEASE_MS, JobQueue, QueueControl};
pub use redis_store::RedisQueueStore;
pub use store::{QueueStore, Retention};
pub use worker::{JobProcessor, QueueWorker};
