//! Bounded worker pool over a shared pull queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use batch_core::{BatchConfig, BatchError, ConversionPort, ConversionResult, WorkItem};
use ractor::{Actor, ActorRef};
use tokio::sync::oneshot;

use crate::messages::{PoolMessage, WorkerMessage};
use crate::pool_actor::{PoolActor, PoolActorState, ProgressFn};
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// Runs a batch of items across `min(max_concurrency, items)` worker actors.
///
/// All items go into one queue owned by a pool actor. Each worker pulls an
/// item, converts it under the per-item timeout and reports back, until the
/// queue is empty. The call returns once every item has a result, or fails
/// with [`BatchError::BatchTimeout`] if the deadline fires first; in that
/// case every actor is killed and partial results are discarded.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    max_concurrency: usize,
    item_timeout: Duration,
    target_extension: String,
}

impl WorkerPool {
    pub fn new(max_concurrency: usize, item_timeout: Duration) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            item_timeout,
            target_extension: BatchConfig::default().target_extension,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.max_concurrency, config.item_timeout())
            .with_target_extension(config.target_extension.clone())
    }

    /// Set the extension given to converted artifact names.
    pub fn with_target_extension(mut self, extension: impl Into<String>) -> Self {
        self.target_extension = extension.into();
        self
    }

    /// Number of workers spawned for a batch of `items` items.
    pub fn worker_count(&self, items: usize) -> usize {
        self.max_concurrency.min(items)
    }

    /// Convert every item, returning exactly one result per item in
    /// completion order.
    pub async fn run<F>(
        &self,
        items: Vec<WorkItem>,
        converter: Arc<dyn ConversionPort>,
        deadline: Duration,
        on_progress: F,
    ) -> Result<Vec<ConversionResult>, BatchError>
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let total = items.len();
        let worker_count = self.worker_count(total);

        let completed = Arc::new(AtomicUsize::new(0));
        let progress: ProgressFn = {
            let completed = Arc::clone(&completed);
            Arc::new(move |done, total| {
                completed.store(done, Ordering::Release);
                on_progress(done, total);
            })
        };

        let (done_tx, done_rx) = oneshot::channel();
        let (pool, _handle) = Actor::spawn(
            None,
            PoolActor,
            PoolActorState::new(items, progress, done_tx),
        )
        .await
        .map_err(|e| BatchError::Pool(format!("Failed to spawn pool: {}", e)))?;

        let mut workers: Vec<ActorRef<WorkerMessage>> = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let args = WorkerArgs {
                worker_id,
                pool: pool.clone(),
                converter: Arc::clone(&converter),
                item_timeout: self.item_timeout,
                target_extension: self.target_extension.clone(),
            };
            match Actor::spawn_linked(None, WorkerActor, args, pool.get_cell()).await {
                Ok((worker, _)) => workers.push(worker),
                Err(e) => {
                    shutdown(&pool, &workers);
                    return Err(BatchError::Pool(format!("Failed to spawn worker: {}", e)));
                }
            }
        }

        tracing::info!(
            "Worker pool started: {} workers for {} items",
            worker_count,
            total
        );

        match tokio::time::timeout(deadline, done_rx).await {
            Ok(Ok(results)) => {
                tracing::info!("Worker pool finished {} items", results.len());
                Ok(results)
            }
            Ok(Err(_)) => {
                shutdown(&pool, &workers);
                Err(BatchError::Pool(
                    "pool stopped before every item reported a result".to_string(),
                ))
            }
            Err(_) => {
                shutdown(&pool, &workers);
                let completed = completed.load(Ordering::Acquire);
                tracing::warn!(
                    "Batch deadline of {:?} elapsed with {}/{} items done",
                    deadline,
                    completed,
                    total
                );
                Err(BatchError::BatchTimeout {
                    deadline,
                    completed,
                    total,
                })
            }
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

/// Forcibly terminate every worker and the pool.
fn shutdown(pool: &ActorRef<PoolMessage>, workers: &[ActorRef<WorkerMessage>]) {
    for worker in workers {
        worker.kill();
    }
    pool.kill();
}
