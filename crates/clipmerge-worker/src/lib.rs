//! Clip merge worker.
//!
//! This crate provides:
//! - The merge orchestrator loop with explicit per-iteration outcomes
//! - Environment configuration
//! - Structured job logging and Prometheus metrics
//! - Graceful shutdown through a watch channel

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use orchestrator::{IterationOutcome, MergeOrchestrator, MergeStage, ScratchContext};
