//! Thin wrapper over an `object_store` backend with key prefixing.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, ObjectStoreExt, PutPayload};

use crate::StorageError;
use crate::config::{S3Config, StorageBackendConfig, StorageConfig, StorageKind, non_empty};

/// Object storage handle shared by archive operations.
///
/// Keys passed in and returned are relative to the configured prefix.
#[derive(Clone)]
pub struct Storage {
    kind: StorageKind,
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl Storage {
    pub async fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let kind = cfg.kind();
        let store: Arc<dyn ObjectStore> = match cfg.backend {
            StorageBackendConfig::S3(s3) => Arc::new(build_s3(s3)?),
            StorageBackendConfig::Filesystem { root } => {
                tokio::fs::create_dir_all(&root).await?;
                Arc::new(object_store::local::LocalFileSystem::new_with_prefix(&root)?)
            }
            StorageBackendConfig::Memory => Arc::new(object_store::memory::InMemory::new()),
        };

        tracing::info!("Object storage ready ({})", kind.as_str());
        Ok(Self {
            kind,
            store,
            prefix: cfg
                .prefix
                .and_then(non_empty)
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
        })
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?).await
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    fn to_path(&self, key: &str) -> Result<Path, StorageError> {
        let key = key.trim_matches('/');
        if key.is_empty() {
            return Err(StorageError::InvalidKey(
                "object key must not be empty".to_string(),
            ));
        }
        Ok(match self.prefix.as_deref() {
            Some(prefix) => Path::from(format!("{prefix}/{key}")),
            None => Path::from(key),
        })
    }

    fn strip_prefix<'a>(&self, location: &'a str) -> &'a str {
        match self.prefix.as_deref() {
            Some(prefix) => location
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(location),
            None => location,
        }
    }

    pub async fn put_bytes(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store.put(&path, PutPayload::from(bytes)).await?;
        Ok(())
    }

    pub async fn get_bytes(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.to_path(key)?;
        Ok(self.store.get(&path).await?.bytes().await?)
    }

    pub async fn put_json<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.put_bytes(key, Bytes::from(bytes)).await
    }

    /// Every key under `prefix`, sorted.
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let path = self.to_path(prefix)?;
        let objects: Vec<_> = self.store.list(Some(&path)).try_collect().await?;
        let mut keys: Vec<String> = objects
            .iter()
            .map(|meta| self.strip_prefix(meta.location.as_ref()).to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

fn build_s3(cfg: S3Config) -> Result<object_store::aws::AmazonS3, StorageError> {
    let mut builder = object_store::aws::AmazonS3Builder::new()
        .with_bucket_name(cfg.bucket)
        .with_region(cfg.region)
        .with_virtual_hosted_style_request(cfg.virtual_hosted_style)
        .with_allow_http(cfg.allow_http);

    if let Some(endpoint) = cfg.endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if let Some(access_key_id) = cfg.access_key_id {
        builder = builder.with_access_key_id(access_key_id);
    }
    if let Some(secret_access_key) = cfg.secret_access_key {
        builder = builder.with_secret_access_key(secret_access_key);
    }
    if let Some(session_token) = cfg.session_token {
        builder = builder.with_token(session_token);
    }

    Ok(builder.build()?)
}
