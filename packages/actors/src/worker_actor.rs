//! Worker actor for converting items pulled from the pool.

use std::any::Any;
use std::borrow::Cow;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use batch_core::{ConversionPort, ConversionResult, ConvertError, WorkItem, output_name};
use futures_util::FutureExt;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::{PoolMessage, WorkerMessage};

/// State for the worker actor.
pub struct WorkerActorState {
    /// Ordinal of this worker within its pool.
    pub worker_id: usize,
    pool: ActorRef<PoolMessage>,
    converter: Arc<dyn ConversionPort>,
    item_timeout: Duration,
    target_extension: String,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: usize,
    pub pool: ActorRef<PoolMessage>,
    pub converter: Arc<dyn ConversionPort>,
    pub item_timeout: Duration,
    pub target_extension: String,
}

/// Worker actor that converts one item at a time until the pool is drained.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!("Starting worker: {}", args.worker_id);

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            pool: args.pool,
            converter: args.converter,
            item_timeout: args.item_timeout,
            target_extension: args.target_extension,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        myself.send_message(WorkerMessage::Next)?;
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Next => {
                let request = ractor::rpc::call(
                    &state.pool,
                    |reply| PoolMessage::RequestItem {
                        worker_id: state.worker_id,
                        actor_id: myself.get_id(),
                        reply,
                    },
                    None,
                )
                .await;

                match request {
                    Ok(CallResult::Success(Some(item))) => {
                        let result = convert_item(
                            state.converter.as_ref(),
                            &item,
                            state.item_timeout,
                            &state.target_extension,
                        )
                        .await;

                        state.pool.send_message(PoolMessage::ItemFinished {
                            worker_id: state.worker_id,
                            result: Box::new(result),
                        })?;
                        myself.send_message(WorkerMessage::Next)?;
                    }
                    Ok(CallResult::Success(None)) => {
                        tracing::debug!("Worker {} found the queue empty", state.worker_id);
                        myself.stop(None);
                    }
                    Ok(_) | Err(_) => {
                        tracing::debug!("Worker {} lost its pool", state.worker_id);
                        myself.stop(Some("pool unavailable".to_string()));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Classify and convert one item under `timeout`, turning every failure
/// mode into a failed result for that item.
pub async fn convert_item(
    converter: &dyn ConversionPort,
    item: &WorkItem,
    timeout: Duration,
    target_extension: &str,
) -> ConversionResult {
    let attempt = async {
        let item = match item.source_kind {
            Some(_) => Cow::Borrowed(item),
            None => {
                let started = Instant::now();
                let kind = converter.classify(&item.raw_content);
                // Classification is synchronous, so the deadline is checked by hand.
                if started.elapsed() >= timeout {
                    return Err(ConvertError::Timeout(timeout));
                }
                Cow::Owned(item.clone().with_source_kind(kind))
            }
        };
        converter.convert(&item).await
    };

    let outcome = match tokio::time::timeout(timeout, AssertUnwindSafe(attempt).catch_unwind()).await
    {
        Ok(Ok(converted)) => converted,
        Ok(Err(panic)) => Err(ConvertError::Panicked(panic_message(panic.as_ref()))),
        Err(_) => Err(ConvertError::Timeout(timeout)),
    };

    match outcome {
        Ok(content) => ConversionResult::succeeded(
            item.path.clone(),
            output_name(&item.path, target_extension),
            content,
        ),
        Err(error) => {
            tracing::warn!("Failed to convert {}: {}", item.path, error);
            ConversionResult::failed(item.path.clone(), error.to_string())
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
