//! Core domain types for the batch conversion system.
//!
//! This crate contains shared types used across all packages:
//! - Job, Step and JobStatus for tracked batch runs
//! - WorkItem, ConversionResult and BatchResult for per-file outcomes
//! - Events for real-time progress updates
//! - The collaborator ports the orchestrator consumes

mod config;
mod conversion;
mod error;
mod events;
mod job;
mod naming;
mod ports;
mod workdir;

pub use config::{BatchConfig, ConfigError};
pub use conversion::{BatchResult, ConversionResult, NamedContent, SourceKind, WorkItem};
pub use error::{ArchiveError, BatchError, ConvertError, RegistryError};
pub use events::JobEvent;
pub use job::{Job, JobId, JobStatus, Step};
pub use naming::{disambiguate_names, natural_cmp, output_name, sort_results};
pub use ports::{ArchiveFuture, ArchivePort, ConversionPort, ConvertFuture};
pub use workdir::WorkDir;
