//! Plugin loading errors

use std::path::PathBuf;

use crate::trace::TracerId;

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("plugin module not found: {}", .0.display())]
    ModuleNotFound(PathBuf),

    #[error("module '{module}' does not export '{symbol}'")]
    MissingEntrypoint { module: String, symbol: &'static str },

    #[error("module '{module}' reports tracer {reported}, expected tracer {expected}")]
    Consistency {
        module: String,
        expected: TracerId,
        reported: TracerId,
    },

    #[error("replayer '{module}' failed to initialize (status {status})")]
    InitializationFailed { module: String, status: i32 },
}
