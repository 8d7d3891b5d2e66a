//! The single-threaded linker context.
//!
//! All [`EngineSink`] calls are funneled through one task draining a queue,
//! so installs serialize no matter how many module tasks are in flight. The
//! task exits once every handle is dropped.

use crate::engine::{EngineError, EngineSink};
use crate::error::{LoaderError, LoaderResult};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use zipline_core::ModuleId;

struct LinkRequest {
    module_id: ModuleId,
    bytecode: Bytes,
    done: oneshot::Sender<Result<(), EngineError>>,
}

/// Handle submitting install requests to the linker task.
#[derive(Clone)]
pub(crate) struct Linker {
    tx: mpsc::Sender<LinkRequest>,
}

impl Linker {
    /// Spawn the linker task for an engine.
    pub fn spawn(engine: Arc<dyn EngineSink>) -> Self {
        let (tx, mut rx) = mpsc::channel::<LinkRequest>(16);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = engine.install(&request.module_id, request.bytecode).await;
                let _ = request.done.send(result);
            }
        });
        Self { tx }
    }

    /// Install a module and wait for the engine's acknowledgement.
    pub async fn install(&self, module_id: ModuleId, bytecode: Bytes) -> LoaderResult<()> {
        let (done, ack) = oneshot::channel();
        self.tx
            .send(LinkRequest {
                module_id: module_id.clone(),
                bytecode,
                done,
            })
            .await
            .map_err(|_| LoaderError::Cancelled)?;

        match ack.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(LoaderError::Engine {
                module_id,
                reason: err.to_string(),
            }),
            Err(_) => Err(LoaderError::Cancelled),
        }
    }
}
