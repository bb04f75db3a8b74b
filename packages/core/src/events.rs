//! Event types for real-time progress updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// Events emitted whenever the job registry mutates a job.
///
/// Each event carries a full snapshot of the job at the time of the
/// mutation, so observers never need to merge partial updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job was registered.
    JobCreated { job: Job, timestamp: DateTime<Utc> },
    /// A step of the job reported progress.
    JobProgress { job: Job, timestamp: DateTime<Utc> },
    /// The job completed with a result.
    JobCompleted { job: Job, timestamp: DateTime<Utc> },
    /// The job failed.
    JobFailed { job: Job, timestamp: DateTime<Utc> },
}

impl JobEvent {
    pub fn created(job: Job) -> Self {
        JobEvent::JobCreated {
            job,
            timestamp: Utc::now(),
        }
    }

    pub fn progress(job: Job) -> Self {
        JobEvent::JobProgress {
            job,
            timestamp: Utc::now(),
        }
    }

    pub fn completed(job: Job) -> Self {
        JobEvent::JobCompleted {
            job,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(job: Job) -> Self {
        JobEvent::JobFailed {
            job,
            timestamp: Utc::now(),
        }
    }

    /// Get the job snapshot carried by the event.
    pub fn job(&self) -> &Job {
        match self {
            JobEvent::JobCreated { job, .. }
            | JobEvent::JobProgress { job, .. }
            | JobEvent::JobCompleted { job, .. }
            | JobEvent::JobFailed { job, .. } => job,
        }
    }

    /// Get the job ID associated with this event.
    pub fn job_id(&self) -> JobId {
        self.job().id
    }

    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobCreated { timestamp, .. }
            | JobEvent::JobProgress { timestamp, .. }
            | JobEvent::JobCompleted { timestamp, .. }
            | JobEvent::JobFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Whether this is the last event a job will emit.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            JobEvent::JobCompleted { .. } | JobEvent::JobFailed { .. }
        )
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobCreated { job, .. } => format!("Job {} created", job.id),
            JobEvent::JobProgress { job, .. } => format!(
                "Job {} at {:.0}% ({})",
                job.id,
                job.overall_progress(),
                job.current_step.as_deref().unwrap_or("-")
            ),
            JobEvent::JobCompleted { job, .. } => match &job.result {
                Some(result) => format!(
                    "Job {} completed: {}/{} files converted",
                    job.id, result.processed_files, result.total_files
                ),
                None => format!("Job {} completed", job.id),
            },
            JobEvent::JobFailed { job, .. } => format!(
                "Job {} failed: {}",
                job.id,
                job.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
