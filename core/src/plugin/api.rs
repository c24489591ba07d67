//! Interfaces implemented by API plugins
//!
//! A plugin module provides up to two objects for one tracer ID: a
//! [`Controller`] that decodes packets for inspection and a [`Replayer`] that
//! executes them against a live device.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::trace::{LogLevel, PacketRecord, TraceHeader, TracerId};

use super::settings::PluginSetting;

/// Per-load decoding parameters handed to every decode call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeContext {
    /// Container version of the trace being decoded
    pub format_version: u32,
}

impl DecodeContext {
    pub fn new(format_version: u32) -> Self {
        Self { format_version }
    }
}

/// A packet decoded by a plugin
///
/// The payload type is private to the plugin that produced it; the replayer
/// of the same tracer downcasts it back.
pub struct DecodedPacket {
    pub packet_id: u16,
    pub name: Cow<'static, str>,
    pub payload: Box<dyn Any + Send + Sync>,
}

impl DecodedPacket {
    pub fn new(
        packet_id: u16,
        name: impl Into<Cow<'static, str>>,
        payload: impl Any + Send + Sync,
    ) -> Self {
        Self {
            packet_id,
            name: name.into(),
            payload: Box::new(payload),
        }
    }

    /// Borrow the payload as a concrete type
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for DecodedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedPacket")
            .field("packet_id", &self.packet_id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Result code returned by [`Replayer::replay`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplayStatus {
    Success,
    /// Packet ID not known to the replayer
    InvalidId,
    /// Arguments could not be reconstructed
    InvalidParams,
    /// Replayer internal error
    Error,
    /// The API call itself failed
    CallError,
    /// The API call returned something other than what was captured
    BadReturn,
    /// Validation layer complaint; expected noise on most traces
    ValidationError,
    Unknown(u32),
}

/// How the engine reacts to a [`ReplayStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Success,
    /// Logged as an error
    HardFailure,
    /// Logged as a warning
    Divergence,
    /// Logged at debug level only
    Suppressed,
    /// Unrecognized code, logged as an error
    Unknown,
}

impl ReplayStatus {
    pub fn classify(self) -> StatusClass {
        match self {
            Self::Success => StatusClass::Success,
            Self::InvalidId | Self::InvalidParams | Self::Error | Self::CallError => {
                StatusClass::HardFailure
            }
            Self::BadReturn => StatusClass::Divergence,
            Self::ValidationError => StatusClass::Suppressed,
            Self::Unknown(_) => StatusClass::Unknown,
        }
    }

    pub fn description(self) -> Cow<'static, str> {
        match self {
            Self::Success => "success".into(),
            Self::InvalidId => "invalid packet id".into(),
            Self::InvalidParams => "invalid parameters".into(),
            Self::Error => "replayer error".into(),
            Self::CallError => "API call failed".into(),
            Self::BadReturn => "return value differs from capture".into(),
            Self::ValidationError => "validation error".into(),
            Self::Unknown(code) => format!("unknown status {code}").into(),
        }
    }
}

/// Where a replayer presents its output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceTarget {
    /// Native window handle supplied by the embedder
    Window { handle: u64 },
    /// Render into an offscreen target of the given size
    Offscreen { width: u32, height: u32 },
}

/// Options passed to [`Replayer::initialize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayOptions {
    /// Enable the API's validation layers
    pub validation: bool,
    pub log_level: LogLevel,
}

/// Free-form diagnostic raised by a replayer outside of a packet's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: LogLevel,
    pub global_index: Option<u64>,
    pub message: String,
}

/// Callback a replayer uses to forward its own log lines
pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Callback a replayer uses to raise diagnostics
pub type DiagnosticCallback = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

/// Packet decoder for one tracer, used for inspection
pub trait Controller: Send + Sync {
    fn tracer_id(&self) -> TracerId;

    /// Decode an API packet; `None` if the packet is not understood
    fn interpret(&self, record: &PacketRecord, ctx: &DecodeContext) -> Option<DecodedPacket>;

    /// One-line human-readable description of a decoded packet
    fn describe(&self, packet: &DecodedPacket) -> String {
        packet.name.to_string()
    }

    /// Entrypoint name for a packet ID, if known
    fn packet_name(&self, packet_id: u16) -> Option<Cow<'static, str>>;
}

/// Packet executor for one tracer
pub trait Replayer: Send {
    fn tracer_id(&self) -> TracerId;

    fn interpret(&self, record: &PacketRecord, ctx: &DecodeContext) -> Option<DecodedPacket>;

    /// Execute a decoded packet
    fn replay(&mut self, packet: &DecodedPacket) -> ReplayStatus;

    /// Create the device and surface; `Err` carries the plugin's status code
    fn initialize(
        &mut self,
        surface: SurfaceTarget,
        options: &ReplayOptions,
        header: &TraceHeader,
    ) -> Result<(), i32>;

    fn deinitialize(&mut self);

    fn set_log_callback(&mut self, callback: LogCallback);

    fn set_log_level(&mut self, level: LogLevel);

    fn register_diagnostic_callback(&mut self, callback: DiagnosticCallback);

    /// Settings the replayer exposes, with their current values
    fn settings(&self) -> Vec<PluginSetting> {
        Vec::new()
    }

    /// Apply externally supplied settings; unknown keys are ignored
    fn update_from_settings(&mut self, _settings: &[PluginSetting]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ReplayStatus::Success.classify(), StatusClass::Success);
        for status in [
            ReplayStatus::InvalidId,
            ReplayStatus::InvalidParams,
            ReplayStatus::Error,
            ReplayStatus::CallError,
        ] {
            assert_eq!(status.classify(), StatusClass::HardFailure);
        }
        assert_eq!(ReplayStatus::BadReturn.classify(), StatusClass::Divergence);
        assert_eq!(ReplayStatus::ValidationError.classify(), StatusClass::Suppressed);
        assert_eq!(ReplayStatus::Unknown(42).classify(), StatusClass::Unknown);
        assert_eq!(ReplayStatus::Unknown(42).description(), "unknown status 42");
    }

    #[test]
    fn test_decoded_payload_downcast() {
        let packet = DecodedPacket::new(9, "vkQueueSubmit", 17u32);
        assert_eq!(packet.payload::<u32>(), Some(&17));
        assert!(packet.payload::<String>().is_none());
    }
}
