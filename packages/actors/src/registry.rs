//! Registry of batch jobs and their progress.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use batch_core::{BatchConfig, BatchResult, Job, JobEvent, JobId, RegistryError};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::broadcaster::ProgressBroadcaster;

struct JobEntry {
    created_at: DateTime<Utc>,
    job: Mutex<Job>,
}

/// Table of job records.
///
/// The map lock is only held to find, insert or remove entries; every
/// mutation of a job happens under that job's own lock, so unrelated
/// batches never serialize on each other. Each successful mutation is
/// published through the [`ProgressBroadcaster`] while the job lock is held,
/// which keeps a single job's events in mutation order.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<JobEntry>>>,
    broadcaster: ProgressBroadcaster,
    step_names: Vec<String>,
    retention: Duration,
}

impl JobRegistry {
    /// Create a new empty registry.
    pub fn new(
        broadcaster: ProgressBroadcaster,
        step_names: Vec<String>,
        retention: Duration,
    ) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            broadcaster,
            step_names,
            retention,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(
            ProgressBroadcaster::new(config.event_capacity),
            config.step_names.clone(),
            config.retention(),
        )
    }

    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        &self.broadcaster
    }

    fn entry(&self, job_id: JobId) -> Option<Arc<JobEntry>> {
        self.jobs.read().get(&job_id).cloned()
    }

    /// Register a new pending job with every step at 0.
    pub fn create(&self, job_id: JobId) -> Result<Job, RegistryError> {
        let job = Job::new(job_id, self.step_names.iter().cloned());
        let entry = Arc::new(JobEntry {
            created_at: job.created_at,
            job: Mutex::new(job),
        });
        let guard = entry.job.lock();

        {
            let mut jobs = self.jobs.write();
            if jobs.contains_key(&job_id) {
                return Err(RegistryError::AlreadyExists(job_id));
            }
            jobs.insert(job_id, Arc::clone(&entry));
        }

        tracing::info!("Job {} created", job_id);
        let snapshot = guard.clone();
        self.broadcaster.publish(JobEvent::created(snapshot.clone()));
        Ok(snapshot)
    }

    /// Set one step's progress. Unknown or finished jobs are ignored.
    pub fn update_step_progress(
        &self,
        job_id: JobId,
        step_index: usize,
        progress: u8,
        label: Option<String>,
    ) {
        let Some(entry) = self.entry(job_id) else {
            tracing::debug!("Progress for unknown job {} ignored", job_id);
            return;
        };

        let mut job = entry.job.lock();
        if !job.set_step_progress(step_index, progress, label) {
            tracing::debug!(
                "Progress for job {} step {} ignored ({})",
                job_id,
                step_index,
                job.status
            );
            return;
        }
        self.broadcaster.publish(JobEvent::progress(job.clone()));
    }

    /// Mark a job completed. Unknown jobs are ignored.
    pub fn complete(&self, job_id: JobId, result: BatchResult) -> Result<(), RegistryError> {
        let Some(entry) = self.entry(job_id) else {
            tracing::warn!("Completion for unknown job {} ignored", job_id);
            return Ok(());
        };

        let mut job = entry.job.lock();
        if job.is_terminal() {
            return Err(RegistryError::AlreadyTerminal(job_id));
        }
        job.complete(result);

        let event = JobEvent::completed(job.clone());
        tracing::info!("{}", event.description());
        self.broadcaster.publish(event);
        Ok(())
    }

    /// Mark a job failed. Unknown jobs are ignored.
    pub fn fail(&self, job_id: JobId, error: impl Into<String>) -> Result<(), RegistryError> {
        let Some(entry) = self.entry(job_id) else {
            tracing::warn!("Failure for unknown job {} ignored", job_id);
            return Ok(());
        };

        let mut job = entry.job.lock();
        if job.is_terminal() {
            return Err(RegistryError::AlreadyTerminal(job_id));
        }
        job.fail(error);

        let event = JobEvent::failed(job.clone());
        tracing::warn!("{}", event.description());
        self.broadcaster.publish(event);
        Ok(())
    }

    /// Get a snapshot of a job.
    pub fn get(&self, job_id: JobId) -> Result<Job, RegistryError> {
        self.entry(job_id)
            .map(|entry| entry.job.lock().clone())
            .ok_or(RegistryError::NotFound(job_id))
    }

    /// Snapshots of every job, oldest first.
    pub fn list(&self) -> Vec<Job> {
        let entries: Vec<Arc<JobEntry>> = self.jobs.read().values().cloned().collect();
        let mut jobs: Vec<Job> = entries.iter().map(|e| e.job.lock().clone()).collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Remove a job and close its event channel.
    pub fn delete(&self, job_id: JobId) -> Option<Job> {
        let entry = self.jobs.write().remove(&job_id)?;
        self.broadcaster.close_job(job_id);
        let job = entry.job.lock().clone();
        Some(job)
    }

    /// Remove every job created longer ago than the retention window,
    /// whatever its status.
    pub fn evict_stale(&self) -> usize {
        let Ok(retention) = chrono::Duration::from_std(self.retention) else {
            return 0;
        };
        match Utc::now().checked_sub_signed(retention) {
            Some(cutoff) => self.evict_created_before(cutoff),
            None => 0,
        }
    }

    /// Remove every job created before `cutoff`, along with any per-job
    /// channel that no longer belongs to a registered job. Returns how many
    /// jobs were removed.
    pub fn evict_created_before(&self, cutoff: DateTime<Utc>) -> usize {
        let evicted = {
            let mut jobs = self.jobs.write();
            let before = jobs.len();
            jobs.retain(|_, entry| entry.created_at >= cutoff);
            before - jobs.len()
        };

        let orphaned = {
            let jobs = self.jobs.read();
            self.broadcaster.retain_jobs(|id| jobs.contains_key(id))
        };
        if evicted > 0 || orphaned > 0 {
            tracing::info!(
                "Evicted {} stale jobs and {} orphaned channels",
                evicted,
                orphaned
            );
        }
        evicted
    }

    /// Run [`evict_stale`](Self::evict_stale) every `interval` until the
    /// registry is dropped.
    pub fn spawn_eviction(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        let interval = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.evict_stale();
            }
        })
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}
