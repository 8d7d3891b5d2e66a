//! The host engine interface.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use zipline_core::ModuleId;

/// Failure reported by the engine when it rejects a module.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

/// Sink accepting compiled bytecode, one module at a time.
///
/// The engine is not thread-safe: the loader guarantees `install` calls are
/// serialized on a single linker task, each module at most once, with every
/// declared dependency installed first.
#[async_trait]
pub trait EngineSink: Send + Sync {
    /// Install compiled bytecode for a module.
    async fn install(&self, module_id: &ModuleId, bytecode: Bytes) -> Result<(), EngineError>;
}
