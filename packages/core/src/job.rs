//! Job domain types for tracked batch runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::BatchResult;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job was created but no step has reported progress yet.
    #[default]
    Pending,
    /// At least one step has started.
    Running,
    /// The batch finished and a result is stored.
    Completed,
    /// The batch hit a fatal error.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named phase of a job with its own progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    /// Progress in percent, `0..=100`.
    pub progress: u8,
}

impl Step {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            progress: 0,
        }
    }
}

/// One batch-conversion run with tracked lifecycle and progress.
///
/// `overall_progress` is derived from `steps` and is recomputed on every
/// step mutation, so the two never drift apart. Once the job reaches a
/// terminal status it no longer accepts step updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Current status.
    pub status: JobStatus,
    steps: Vec<Step>,
    overall_progress: f64,
    /// Label of the step that last reported progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// Aggregate result, set on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<BatchResult>,
    /// Failure message, set when the job fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job with the given ordered step names, all at 0.
    pub fn new<I, S>(id: JobId, step_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            steps: step_names.into_iter().map(Step::new).collect(),
            overall_progress: 0.0,
            current_step: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
        }
    }

    /// The job's steps in order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Mean of all step progress values.
    pub fn overall_progress(&self) -> f64 {
        self.overall_progress
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Set one step's progress and recompute the overall progress.
    ///
    /// Progress above 100 is clamped. The first update moves a pending job
    /// to running. Returns `false` without touching the job if the job is
    /// terminal or `index` is out of range.
    pub fn set_step_progress(&mut self, index: usize, progress: u8, label: Option<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        let Some(step) = self.steps.get_mut(index) else {
            return false;
        };

        step.progress = progress.min(100);
        self.current_step = Some(label.unwrap_or_else(|| step.name.clone()));
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Running;
        }
        self.updated_at = Utc::now();
        self.recompute_progress();
        true
    }

    /// Mark the job completed with its aggregate result.
    pub fn complete(&mut self, result: BatchResult) {
        let now = Utc::now();
        for step in &mut self.steps {
            step.progress = 100;
        }
        self.recompute_progress();
        if self.steps.is_empty() {
            self.overall_progress = 100.0;
        }
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Mark the job failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.failed_at = Some(now);
        self.updated_at = now;
    }

    fn recompute_progress(&mut self) {
        self.overall_progress = if self.steps.is_empty() {
            0.0
        } else {
            let sum: u32 = self.steps.iter().map(|s| u32::from(s.progress)).sum();
            f64::from(sum) / self.steps.len() as f64
        };
    }
}
