//! Scoped working directory for extracted bundles.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::TempDir;

/// A directory that is removed when dropped.
///
/// Archives hand one of these out per extraction; whoever holds it owns the
/// files inside, and every exit path of that owner cleans them up.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl WorkDir {
    /// Create a fresh directory under `root`, named `batch-<timestamp>-<random>`.
    pub fn create_in(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("batch-{}-", Utc::now().format("%Y%m%d%H%M%S%3f")))
            .tempdir_in(root)?;
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match dir.close() {
            Ok(()) => tracing::debug!("Removed work dir {:?}", self.path),
            Err(e) => tracing::warn!("Failed to remove work dir {:?}: {}", self.path, e),
        }
    }
}
