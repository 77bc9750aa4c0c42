//! Job system: concurrent workflow runs with cancellation and shutdown.
//!
//! Core components:
//! - `state`: job state machine (Pending → Running → Completed/Failed/Cancelled)
//! - `registry`: shared table of every job created this session
//! - `sink`: per-job log appender handed to executors
//! - `worker`: task body that drives one job to a terminal state
//! - `manager`: starts, queries, cancels and shuts down jobs

pub mod manager;
pub mod registry;
pub mod sink;
pub mod state;
pub mod worker;

pub use manager::{CancelAck, JobManager, ShutdownReport};
pub use registry::{JobRegistry, RegistrySummary};
pub use sink::LogSink;
pub use state::{Job, JobId, JobSnapshot, JobState, LogEntry};
pub use worker::{Worker, WorkerDeps};
