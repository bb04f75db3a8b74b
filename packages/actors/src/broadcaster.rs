//! Progress event fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use batch_core::{JobEvent, JobId};
use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Publishes job events to two kinds of observers at once:
///
/// - the broadcast channel, which sees every job's events
/// - per-job channels, which see only the job they subscribed to
///
/// Delivery is best effort. Events published while nobody listens are
/// dropped, and slow receivers may lag and miss events.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    inner: Arc<BroadcasterInner>,
}

struct BroadcasterInner {
    all: broadcast::Sender<JobEvent>,
    jobs: RwLock<HashMap<JobId, broadcast::Sender<JobEvent>>>,
    capacity: usize,
}

impl ProgressBroadcaster {
    /// Create a broadcaster whose channels buffer `capacity` events each.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (all, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(BroadcasterInner {
                all,
                jobs: RwLock::new(HashMap::new()),
                capacity,
            }),
        }
    }

    /// Subscribe to every job's events.
    pub fn subscribe_all(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.all.subscribe()
    }

    /// Subscribe to one job's events.
    pub fn subscribe_job(&self, job_id: JobId) -> broadcast::Receiver<JobEvent> {
        self.inner
            .jobs
            .write()
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe()
    }

    /// Publish an event to both targets. Returns how many receivers got it.
    pub fn publish(&self, event: JobEvent) -> usize {
        let job_id = event.job_id();
        tracing::trace!("{}", event.description());

        let addressed = self.inner.jobs.read().get(&job_id).cloned();
        let mut delivered = match addressed {
            Some(tx) => match tx.send(event.clone()) {
                Ok(n) => n,
                Err(_) => {
                    self.prune(job_id);
                    0
                }
            },
            None => 0,
        };

        if let Ok(n) = self.inner.all.send(event) {
            delivered += n;
        }
        delivered
    }

    /// Drop the per-job channel, ending every subscription to it.
    pub fn close_job(&self, job_id: JobId) {
        self.inner.jobs.write().remove(&job_id);
    }

    /// Drop every per-job channel whose job fails `keep`, ending its
    /// subscriptions. Returns how many were dropped.
    pub fn retain_jobs(&self, keep: impl Fn(&JobId) -> bool) -> usize {
        let mut jobs = self.inner.jobs.write();
        let before = jobs.len();
        jobs.retain(|id, _| keep(id));
        before - jobs.len()
    }

    /// Number of per-job channels currently open.
    pub fn job_channel_count(&self) -> usize {
        self.inner.jobs.read().len()
    }

    fn prune(&self, job_id: JobId) {
        let mut jobs = self.inner.jobs.write();
        if jobs
            .get(&job_id)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            jobs.remove(&job_id);
        }
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(1024)
    }
}
