//! Backend selection and environment parsing.

use std::path::PathBuf;

use crate::StorageError;

const DEFAULT_FS_ROOT: &str = "./data/object_store";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    S3,
    Filesystem,
    Memory,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::S3 => "s3",
            StorageKind::Filesystem => "filesystem",
            StorageKind::Memory => "memory",
        }
    }
}

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub allow_http: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub virtual_hosted_style: bool,
}

#[derive(Debug, Clone)]
pub enum StorageBackendConfig {
    S3(S3Config),
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional key prefix applied to all object keys.
    pub prefix: Option<String>,
    /// Local directory under which bundles are extracted.
    pub work_root: PathBuf,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self::with_backend(StorageBackendConfig::Memory)
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self::with_backend(StorageBackendConfig::Filesystem { root: root.into() })
    }

    pub fn s3(cfg: S3Config) -> Self {
        Self::with_backend(StorageBackendConfig::S3(cfg))
    }

    fn with_backend(backend: StorageBackendConfig) -> Self {
        Self {
            backend,
            prefix: None,
            work_root: default_work_root(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = non_empty(prefix.into());
        self
    }

    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = root.into();
        self
    }

    pub fn kind(&self) -> StorageKind {
        match self.backend {
            StorageBackendConfig::S3(_) => StorageKind::S3,
            StorageBackendConfig::Filesystem { .. } => StorageKind::Filesystem,
            StorageBackendConfig::Memory => StorageKind::Memory,
        }
    }

    /// Build a config from environment variables.
    ///
    /// - `STORAGE_BACKEND`: `s3`, `filesystem` (default) or `memory`
    /// - `STORAGE_FS_ROOT`: filesystem root (default `./data/object_store`)
    /// - `STORAGE_PREFIX`: key prefix applied to every object
    /// - `STORAGE_WORK_ROOT`: where bundles are extracted (default: a
    ///   `batch-convert` directory under the system temp dir)
    /// - `S3_BUCKET` (required for s3), `AWS_REGION` (default `us-east-1`),
    ///   `S3_ENDPOINT`, `S3_ALLOW_HTTP`, `S3_VIRTUAL_HOSTED_STYLE`,
    ///   `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN`
    pub fn from_env() -> Result<Self, StorageError> {
        let backend = match env_var("STORAGE_BACKEND").as_deref() {
            Some("s3") => StorageBackendConfig::S3(read_s3_config()?),
            Some("memory") | Some("mem") => StorageBackendConfig::Memory,
            Some("filesystem") | Some("fs") | None => StorageBackendConfig::Filesystem {
                root: env_var("STORAGE_FS_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_FS_ROOT)),
            },
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported STORAGE_BACKEND={other} (expected s3|filesystem|memory)"
                )));
            }
        };

        Ok(Self {
            backend,
            prefix: env_var("STORAGE_PREFIX"),
            work_root: env_var("STORAGE_WORK_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(default_work_root),
        })
    }
}

fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("batch-convert")
}

pub(crate) fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(non_empty)
}

fn env_bool(name: &str) -> Result<Option<bool>, StorageError> {
    let Some(raw) = env_var(name) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(Some(true)),
        "0" | "false" | "no" | "n" => Ok(Some(false)),
        _ => Err(StorageError::InvalidConfig(format!(
            "invalid boolean for {name}={raw} (expected true/false)"
        ))),
    }
}

fn read_s3_config() -> Result<S3Config, StorageError> {
    let bucket = env_var("S3_BUCKET").ok_or_else(|| {
        StorageError::InvalidConfig("S3_BUCKET is required for s3 backend".into())
    })?;
    let endpoint = env_var("S3_ENDPOINT");
    // Plain-http endpoints (local MinIO and friends) imply allow_http.
    let allow_http = match env_bool("S3_ALLOW_HTTP")? {
        Some(v) => v,
        None => endpoint
            .as_deref()
            .is_some_and(|e| e.to_ascii_lowercase().starts_with("http://")),
    };

    Ok(S3Config {
        bucket,
        region: env_var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
        endpoint,
        allow_http,
        access_key_id: env_var("AWS_ACCESS_KEY_ID"),
        secret_access_key: env_var("AWS_SECRET_ACCESS_KEY"),
        session_token: env_var("AWS_SESSION_TOKEN"),
        virtual_hosted_style: env_bool("S3_VIRTUAL_HOSTED_STYLE")?.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_set_backend_and_prefix() {
        let cfg = StorageConfig::filesystem("/srv/objects")
            .with_prefix("  tenant-a/ ")
            .with_work_root("/tmp/work");
        assert_eq!(cfg.kind(), StorageKind::Filesystem);
        assert_eq!(cfg.prefix.as_deref(), Some("tenant-a/"));
        assert_eq!(cfg.work_root, PathBuf::from("/tmp/work"));

        assert_eq!(StorageConfig::memory().with_prefix("  ").prefix, None);
    }

    #[test]
    fn non_empty_trims() {
        assert_eq!(non_empty(" a ".to_string()).as_deref(), Some("a"));
        assert_eq!(non_empty("   ".to_string()), None);
    }
}
