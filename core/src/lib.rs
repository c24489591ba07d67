//! gfxreplay core - graphics API trace replay
//!
//! This crate loads traces captured by a graphics API tracer and replays them
//! through per-API plugins.
//!
//! # Architecture
//!
//! - [`trace`] - Container reader/writer; indexes a file into a [`TraceSession`]
//! - [`interpret`] - Routes each packet to built-in handling or an API [`Controller`]
//! - [`plugin`] - Loads controllers and replayers per tracer ID with matched unload
//! - [`replay`] - [`ReplayEngine`] state machine on a dedicated worker thread
//! - [`config`] - `config.toml` handling

pub mod config;
pub mod interpret;
pub mod plugin;
pub mod replay;
#[cfg(test)]
pub mod test_utils;
pub mod trace;

// Re-export trace types
pub use trace::{
    FormatError, LogLevel, PacketKind, PacketRecord, TraceError, TraceHeader, TraceSession,
    TracerId, open_and_index,
};

// Re-export dispatch types
pub use interpret::{InterpretedPacket, LogMessage, MarkerKind, PacketClass, interpret_session};

// Re-export plugin types
pub use plugin::{
    Controller, DecodeContext, DecodedPacket, PluginError, PluginLoader, ReplayStatus, Replayer,
    ReplayerSet, StaticModuleTable, SurfaceTarget,
};

// Re-export replay types
pub use replay::{
    EngineError, EngineState, LogSink, ReplayEngine, ReplayEvent, ReplaySummary, TracingLogSink,
};

// Re-export config types
pub use config::{Config, ConfigError};
