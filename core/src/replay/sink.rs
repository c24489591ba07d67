//! Destination for packet-level replay diagnostics

use crate::trace::LogLevel;

/// Receives messages raised while replaying, tagged with the packet they concern
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, global_index: Option<u64>, message: &str);
}

/// Forwards everything to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: LogLevel, global_index: Option<u64>, message: &str) {
        match level {
            LogLevel::Error => tracing::error!(packet = ?global_index, "{}", message),
            LogLevel::Warning => tracing::warn!(packet = ?global_index, "{}", message),
            LogLevel::Info => tracing::info!(packet = ?global_index, "{}", message),
            LogLevel::Verbose => tracing::debug!(packet = ?global_index, "{}", message),
            LogLevel::Debug => tracing::trace!(packet = ?global_index, "{}", message),
        }
    }
}
