//! Message types for actor communication.

use batch_core::{ConversionResult, WorkItem};
use ractor::{ActorId, RpcReplyPort};

/// Messages for the PoolActor.
#[derive(Debug)]
pub enum PoolMessage {
    /// Hand the next pending item to a worker, or `None` once drained.
    RequestItem {
        worker_id: usize,
        actor_id: ActorId,
        reply: RpcReplyPort<Option<WorkItem>>,
    },

    /// Report the outcome of an item previously handed out.
    ItemFinished {
        worker_id: usize,
        result: Box<ConversionResult>,
    },
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Pull the next item from the pool and process it.
    Next,
}
