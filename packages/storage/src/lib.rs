//! Object storage for batch bundles.
//!
//! `object_store` provides the S3, local filesystem and in-memory backends;
//! [`ObjectStoreArchive`] adapts them to the orchestrator's archive port.

mod archive;
mod config;
mod store;

pub use archive::ObjectStoreArchive;
pub use config::{S3Config, StorageBackendConfig, StorageConfig, StorageKind};
pub use store::Storage;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
