//! Collaborator interfaces consumed by the batch orchestrator.

use std::future::Future;
use std::pin::Pin;

use crate::{ArchiveError, ConvertError, NamedContent, SourceKind, WorkDir, WorkItem};

/// Future type for async conversions.
pub type ConvertFuture = Pin<Box<dyn Future<Output = Result<String, ConvertError>> + Send>>;

/// Future type for archive operations borrowing the archive.
pub type ArchiveFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ArchiveError>> + Send + 'a>>;

/// The content transformation.
///
/// Implement this trait to define how one source file becomes its converted
/// form. Calls may be slow and may fail; the worker pool wraps each call in a
/// timeout and never lets a failure escape the item it belongs to.
pub trait ConversionPort: Send + Sync + 'static {
    /// Pick a category for the content before conversion.
    fn classify(&self, _content: &str) -> SourceKind {
        SourceKind::generic()
    }

    /// Convert one item and return the converted content.
    fn convert(&self, item: &WorkItem) -> ConvertFuture;
}

/// Reading input bundles and writing output bundles.
pub trait ArchivePort: Send + Sync {
    /// Unpack a bundle into a fresh working directory unique to this call.
    fn extract<'a>(&'a self, bundle: &'a str) -> ArchiveFuture<'a, WorkDir>;

    /// Pack named artifacts into a bundle and return its reference.
    fn pack<'a>(&'a self, files: &'a [NamedContent]) -> ArchiveFuture<'a, String>;
}
