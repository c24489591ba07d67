//! Replay engine errors

use super::events::EngineState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("replay engine is busy ({0})")]
    Busy(EngineState),

    #[error("no trace loaded")]
    NoTraceLoaded,

    #[error("replay worker thread is gone")]
    WorkerDisconnected,
}
