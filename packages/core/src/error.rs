//! Error taxonomy for items, archives, the registry and whole batches.

use std::time::Duration;

use crate::{JobId, SourceKind};

/// Failure of a single conversion. Always captured into that item's result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("conversion failed: {0}")]
    Failed(String),

    #[error("conversion timed out after {0:?}")]
    Timeout(Duration),

    #[error("converter panicked: {0}")]
    Panicked(String),

    #[error("no converter for source kind: {0}")]
    NoConverter(SourceKind),
}

impl ConvertError {
    pub fn failed(message: impl Into<String>) -> Self {
        ConvertError::Failed(message.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("extraction failed: {0}")]
    Extract(String),

    #[error("packing failed: {0}")]
    Pack(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job already finished: {0}")]
    AlreadyTerminal(JobId),
}

/// Job-level failures. These are the only errors that escape a batch run.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("extraction failed: {0}")]
    Extraction(#[source] ArchiveError),

    #[error("failed to read extracted files: {0}")]
    Discovery(String),

    #[error("batch timed out after {deadline:?} with {completed} of {total} files processed")]
    BatchTimeout {
        deadline: Duration,
        completed: usize,
        total: usize,
    },

    #[error("worker pool error: {0}")]
    Pool(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl BatchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BatchError::BatchTimeout { .. })
    }
}
