//! [`ArchivePort`] over object storage.
//!
//! A bundle is a key prefix: every object under it is one input file, its
//! path taken from the key relative to the prefix. Packing writes each
//! artifact under a fresh `converted/<timestamp>-<ulid>` prefix next to a
//! `manifest.json`, and returns that prefix as the bundle reference.

use std::path::{Component, Path, PathBuf};

use batch_core::{ArchiveError, ArchiveFuture, ArchivePort, NamedContent, WorkDir};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use ulid::Ulid;

use crate::{Storage, StorageConfig, StorageError};

const MANIFEST: &str = "manifest.json";

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    created_at: DateTime<Utc>,
    files: Vec<&'a str>,
}

pub struct ObjectStoreArchive {
    storage: Storage,
    work_root: PathBuf,
    output_prefix: String,
}

impl ObjectStoreArchive {
    pub fn new(storage: Storage, work_root: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            work_root: work_root.into(),
            output_prefix: "converted".to_string(),
        }
    }

    /// Prefix under which packed bundles are written.
    pub fn with_output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    /// Archive over storage configured from the environment, extracting into
    /// `STORAGE_WORK_ROOT`.
    pub async fn from_env() -> Result<Self, StorageError> {
        let cfg = StorageConfig::from_env()?;
        let work_root = cfg.work_root.clone();
        Ok(Self::new(Storage::new(cfg).await?, work_root))
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    async fn extract_into(&self, bundle: &str) -> Result<WorkDir, ArchiveError> {
        let bundle = bundle.trim_matches('/');
        let keys = self.storage.list_keys(bundle).await.map_err(backend)?;
        if keys.is_empty() {
            return Err(ArchiveError::Extract(format!("no objects under {bundle}")));
        }

        let dir = WorkDir::create_in(&self.work_root)?;
        for key in &keys {
            let relative = key
                .strip_prefix(bundle)
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or(key.as_str());
            let relative = safe_relative(relative).ok_or_else(|| {
                ArchiveError::Extract(format!("unsafe entry name in bundle: {key}"))
            })?;
            let target = dir.path().join(relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let bytes = self.storage.get_bytes(key).await.map_err(backend)?;
            tokio::fs::write(&target, &bytes).await?;
        }

        tracing::info!(
            "Extracted {} objects from {} into {:?}",
            keys.len(),
            bundle,
            dir.path()
        );
        Ok(dir)
    }

    async fn pack_files(&self, files: &[NamedContent]) -> Result<String, ArchiveError> {
        let created_at = Utc::now();
        let bundle = format!(
            "{}/{}-{}",
            self.output_prefix,
            created_at.format("%Y%m%d%H%M%S"),
            Ulid::new()
        );

        for file in files {
            if safe_relative(&file.name).is_none() {
                return Err(ArchiveError::Pack(format!(
                    "unsafe artifact name: {:?}",
                    file.name
                )));
            }
            self.storage
                .put_bytes(
                    &format!("{bundle}/{}", file.name),
                    Bytes::from(file.content.clone()),
                )
                .await
                .map_err(pack_error)?;
        }
        let manifest = Manifest {
            created_at,
            files: files.iter().map(|f| f.name.as_str()).collect(),
        };
        self.storage
            .put_json(&format!("{bundle}/{MANIFEST}"), &manifest)
            .await
            .map_err(pack_error)?;

        tracing::info!("Packed {} files into {}", files.len(), bundle);
        Ok(bundle)
    }
}

impl ArchivePort for ObjectStoreArchive {
    fn extract<'a>(&'a self, bundle: &'a str) -> ArchiveFuture<'a, WorkDir> {
        Box::pin(self.extract_into(bundle))
    }

    fn pack<'a>(&'a self, files: &'a [NamedContent]) -> ArchiveFuture<'a, String> {
        Box::pin(self.pack_files(files))
    }
}

/// `None` for names that would land outside the target directory.
fn safe_relative(name: &str) -> Option<&Path> {
    let path = Path::new(name);
    let contained = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    contained.then_some(path)
}

fn backend(e: StorageError) -> ArchiveError {
    ArchiveError::Backend(e.to_string())
}

fn pack_error(e: StorageError) -> ArchiveError {
    ArchiveError::Pack(e.to_string())
}
