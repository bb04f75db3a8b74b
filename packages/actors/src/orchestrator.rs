//! Batch orchestration: extract, convert, package, finalize.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use batch_core::{
    ArchivePort, BatchConfig, BatchError, BatchResult, ConversionPort, JobId, WorkItem,
};
use walkdir::WalkDir;

use crate::pool::WorkerPool;
use crate::registry::JobRegistry;

/// Index of the extraction step.
pub const STEP_EXTRACT: usize = 0;
/// Index of the conversion step.
pub const STEP_CONVERT: usize = 1;
/// Index of the packaging step.
pub const STEP_PACKAGE: usize = 2;

/// Runs whole batches and keeps their jobs up to date in the registry.
///
/// A run creates a job, extracts the bundle, converts every discovered
/// file on a [`WorkerPool`], sorts and aggregates the results, packs the
/// successful outputs and finally completes the job. Extraction failures
/// and the batch deadline fail the job; packaging failures only leave the
/// bundle reference empty.
pub struct BatchOrchestrator {
    registry: Arc<JobRegistry>,
    config: BatchConfig,
    pool: WorkerPool,
}

impl BatchOrchestrator {
    pub fn new(registry: Arc<JobRegistry>, config: BatchConfig) -> Self {
        let pool = WorkerPool::from_config(&config);
        Self {
            registry,
            config,
            pool,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run a batch to completion and return its job id and result.
    pub async fn run(
        &self,
        bundle: &str,
        converter: Arc<dyn ConversionPort>,
        archiver: &dyn ArchivePort,
    ) -> Result<(JobId, BatchResult), BatchError> {
        let job_id = self.start_job()?;
        let result = self.drive(job_id, bundle, converter, archiver).await?;
        Ok((job_id, result))
    }

    /// Start a batch in the background and return its job id right away.
    ///
    /// The job is registered before this returns, so callers can poll
    /// [`JobRegistry::get`] or subscribe to its events immediately.
    pub fn spawn(
        self: &Arc<Self>,
        bundle: impl Into<String>,
        converter: Arc<dyn ConversionPort>,
        archiver: Arc<dyn ArchivePort>,
    ) -> Result<JobId, BatchError> {
        let job_id = self.start_job()?;
        let this = Arc::clone(self);
        let bundle = bundle.into();
        tokio::spawn(async move {
            // The outcome is recorded on the job.
            let _ = this
                .drive(job_id, &bundle, converter, archiver.as_ref())
                .await;
        });
        Ok(job_id)
    }

    fn start_job(&self) -> Result<JobId, BatchError> {
        let job_id = JobId::new();
        self.registry.create(job_id)?;
        Ok(job_id)
    }

    /// Execute a registered job and record its terminal state.
    async fn drive(
        &self,
        job_id: JobId,
        bundle: &str,
        converter: Arc<dyn ConversionPort>,
        archiver: &dyn ArchivePort,
    ) -> Result<BatchResult, BatchError> {
        tracing::info!("Batch {} started for bundle {}", job_id, bundle);

        match self.execute(job_id, bundle, converter, archiver).await {
            Ok(result) => {
                self.registry.complete(job_id, result.clone())?;
                Ok(result)
            }
            Err(error) => {
                if let Err(e) = self.registry.fail(job_id, error.to_string()) {
                    tracing::warn!("Could not mark job {} failed: {}", job_id, e);
                }
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        job_id: JobId,
        bundle: &str,
        converter: Arc<dyn ConversionPort>,
        archiver: &dyn ArchivePort,
    ) -> Result<BatchResult, BatchError> {
        let registry = &self.registry;

        registry.update_step_progress(
            job_id,
            STEP_EXTRACT,
            0,
            Some(format!("extracting {bundle}")),
        );
        // Dropping the work dir removes it, on every return path below.
        let work_dir = archiver
            .extract(bundle)
            .await
            .map_err(BatchError::Extraction)?;

        let items = discover(work_dir.path().to_path_buf(), self.config.clone()).await?;
        let total = items.len();
        registry.update_step_progress(
            job_id,
            STEP_EXTRACT,
            100,
            Some(format!("found {total} files")),
        );

        registry.update_step_progress(
            job_id,
            STEP_CONVERT,
            convert_progress(0, total),
            Some(format!("converting {total} files")),
        );
        let progress_registry = Arc::clone(registry);
        let results = self
            .pool
            .run(
                items,
                converter,
                self.config.batch_deadline(),
                move |done, total| {
                    progress_registry.update_step_progress(
                        job_id,
                        STEP_CONVERT,
                        convert_progress(done, total),
                        Some(format!("converted {done}/{total} files")),
                    );
                },
            )
            .await?;
        registry.update_step_progress(job_id, STEP_CONVERT, 100, None);

        let mut result = BatchResult::from_results(results);
        let artifacts = result.artifacts();
        registry.update_step_progress(
            job_id,
            STEP_PACKAGE,
            10,
            Some(format!("packaging {} files", artifacts.len())),
        );
        if artifacts.is_empty() {
            tracing::info!("Batch {} produced no artifacts to pack", job_id);
        } else {
            match archiver.pack(&artifacts).await {
                Ok(bundle) => result = result.with_bundle(bundle),
                Err(e) => {
                    tracing::warn!("Failed to pack batch {}: {}", job_id, e);
                    result = result.with_packaging_error(e.to_string());
                }
            }
        }
        registry.update_step_progress(job_id, STEP_PACKAGE, 100, None);

        drop(work_dir);
        Ok(result)
    }
}

/// Conversion-step progress after `done` of `total` items: the first and
/// last 10% of the step are reserved for setup and teardown.
pub fn convert_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 10;
    }
    let share = (done.min(total) as f64 / total as f64) * 80.0;
    10 + share.round() as u8
}

/// Collect every matching file under `root` as a work item, in path order.
/// Items are left unclassified; workers classify them.
async fn discover(root: PathBuf, config: BatchConfig) -> Result<Vec<WorkItem>, BatchError> {
    tokio::task::spawn_blocking(move || discover_blocking(&root, &config))
        .await
        .map_err(|e| BatchError::Discovery(e.to_string()))?
}

fn discover_blocking(root: &Path, config: &BatchConfig) -> Result<Vec<WorkItem>, BatchError> {
    let mut items = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| BatchError::Discovery(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let extension = entry.path().extension().and_then(|e| e.to_str());
        if !config.includes_extension(extension) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| BatchError::Discovery(e.to_string()))?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let bytes = std::fs::read(entry.path())
            .map_err(|e| BatchError::Discovery(format!("{path}: {e}")))?;
        let content = String::from_utf8_lossy(&bytes).into_owned();

        items.push(WorkItem::new(path, content));
    }

    tracing::debug!("Discovered {} files under {:?}", items.len(), root);
    Ok(items)
}
