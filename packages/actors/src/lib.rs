//! Actor system for batch conversion.
//!
//! This crate provides the Ractor-based worker pool and the pieces that
//! turn many independent conversions into one tracked batch.
//!
//! # Architecture
//!
//! - `PoolActor` - Owns the shared work queue and collects results
//! - `WorkerActor` - Pulls items from the pool and converts them one at a time
//! - `WorkerPool` - Spawns the actors for one batch and enforces its deadline
//! - `JobRegistry` - Job records with per-job locking, published through
//!   the `ProgressBroadcaster`
//! - `BatchOrchestrator` - Extract, convert, package and finalize a job
//!
//! # Usage
//!
//! ```ignore
//! use actors::{BatchOrchestrator, JobRegistry};
//!
//! let registry = Arc::new(JobRegistry::from_config(&config));
//! let orchestrator = BatchOrchestrator::new(registry.clone(), config);
//! let (job_id, result) = orchestrator.run("uploads/batch-1", converter, &archive).await?;
//! ```

mod broadcaster;
mod converter;
mod messages;
mod orchestrator;
mod pool;
mod pool_actor;
mod registry;
mod worker_actor;

pub use broadcaster::ProgressBroadcaster;
pub use converter::{Classifier, ConverterRegistry, FnConverter};
pub use messages::{PoolMessage, WorkerMessage};
pub use orchestrator::{
    BatchOrchestrator, STEP_CONVERT, STEP_EXTRACT, STEP_PACKAGE, convert_progress,
};
pub use pool::WorkerPool;
pub use pool_actor::{PoolActor, ProgressFn};
pub use registry::JobRegistry;
pub use worker_actor::{WorkerActor, convert_item};

/// Re-export core types for convenience.
pub use batch_core::{
    ArchivePort, BatchConfig, BatchError, BatchResult, ConversionPort, ConversionResult,
    ConvertError, ConvertFuture, Job, JobEvent, JobId, JobStatus, SourceKind, WorkItem,
};
