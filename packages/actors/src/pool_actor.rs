//! Pool actor owning the shared work queue and the result collection.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use batch_core::{ConversionResult, WorkItem};
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::oneshot;

use crate::messages::PoolMessage;

/// Callback invoked with `(completed, total)` after every recorded result.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// State for the pool actor.
///
/// Workers pull from `pending` one item at a time, so fast workers drain
/// more of the queue than slow ones. Results are appended in arrival order;
/// once every item has a result the collection is sent through `done`.
pub struct PoolActorState {
    pending: VecDeque<WorkItem>,
    results: Vec<ConversionResult>,
    total: usize,
    /// Item currently held by each worker, keyed by worker actor.
    in_flight: HashMap<ActorId, (usize, String)>,
    on_progress: ProgressFn,
    done: Option<oneshot::Sender<Vec<ConversionResult>>>,
}

impl PoolActorState {
    /// Create a new pool state over the given items.
    pub fn new(
        items: Vec<WorkItem>,
        on_progress: ProgressFn,
        done: oneshot::Sender<Vec<ConversionResult>>,
    ) -> Self {
        let total = items.len();
        Self {
            pending: items.into(),
            results: Vec::with_capacity(total),
            total,
            in_flight: HashMap::new(),
            on_progress,
            done: Some(done),
        }
    }

    /// Record one result. Returns `true` once every item has a result.
    fn record(&mut self, result: ConversionResult) -> bool {
        if self.done.is_none() {
            tracing::warn!("Dropping late result for {}", result.original);
            return true;
        }

        self.results.push(result);
        let completed = self.results.len();
        (self.on_progress)(completed, self.total);

        if completed < self.total {
            return false;
        }

        if let Some(done) = self.done.take() {
            let results = std::mem::take(&mut self.results);
            if done.send(results).is_err() {
                tracing::debug!("Pool finished after its caller stopped waiting");
            }
        }
        true
    }
}

/// Pool actor that serves items to workers and aggregates their results.
pub struct PoolActor;

impl Actor for PoolActor {
    type Msg = PoolMessage;
    type State = PoolActorState;
    type Arguments = PoolActorState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!("Starting pool actor for {} items", args.total);
        Ok(args)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            PoolMessage::RequestItem {
                worker_id,
                actor_id,
                reply,
            } => {
                let next = state.pending.pop_front();
                match &next {
                    Some(item) => {
                        state
                            .in_flight
                            .insert(actor_id, (worker_id, item.path.clone()));
                    }
                    None => {
                        state.in_flight.remove(&actor_id);
                    }
                }
                let _ = reply.send(next);
            }

            PoolMessage::ItemFinished { worker_id, result } => {
                state.in_flight.retain(|_, (id, _)| *id != worker_id);
                tracing::debug!(
                    "Worker {} finished {} (success: {})",
                    worker_id,
                    result.original,
                    result.success
                );
                if state.record(*result) {
                    myself.stop(Some("batch complete".to_string()));
                }
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorFailed(cell, error) => {
                // A crashed worker still owes a result for the item it held.
                if let Some((worker_id, path)) = state.in_flight.remove(&cell.get_id()) {
                    tracing::warn!("Worker {} crashed on {}: {}", worker_id, path, error);
                    let result = ConversionResult::failed(path, format!("worker crashed: {error}"));
                    if state.record(result) {
                        myself.stop(Some("batch complete".to_string()));
                    }
                } else {
                    tracing::warn!("Worker {} crashed while idle: {}", cell.get_id(), error);
                }
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                tracing::debug!("Worker {} stopped: {:?}", cell.get_id(), reason);
            }
            _ => {}
        }
        Ok(())
    }
}
