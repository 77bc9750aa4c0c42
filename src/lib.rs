//! flowrun: run named multi-step workflows as cancellable background jobs.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod llm;
pub mod worker;
pub mod workflow;
