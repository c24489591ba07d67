//! On-disk layout of the trace container
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Header (96 bytes)                            │
//! │ ├─ magic: [u8; 4] = "GXTR"                   │
//! │ ├─ format_version: u32                       │
//! │ ├─ uuid: [u8; 16]                            │
//! │ ├─ first_packet_offset: u64                  │
//! │ ├─ trace_start_time: u64                     │
//! │ ├─ pointer_size: u8                          │
//! │ ├─ tracer_count: u8                          │
//! │ ├─ reserved: [u8; 2]                         │
//! │ ├─ tracers: [{id: u8, flags: u8}; 16]        │
//! │ ├─ gpu_info_count: u32                       │
//! │ └─ reserved: [u8; 16]                        │
//! ├──────────────────────────────────────────────┤
//! │ GPU info (gpu_info_count × 16 bytes)         │
//! ├──────────────────────────────────────────────┤
//! │ Packet stream                                │
//! │ repeated { size: u64; envelope; body }       │
//! ├──────────────────────────────────────────────┤
//! │ Portability table packet (optional)          │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. `size` counts the whole frame including
//! the size prefix itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Magic bytes at the start of every trace file
pub const TRACE_MAGIC: [u8; 4] = *b"GXTR";

/// Oldest format version this reader accepts
pub const FORMAT_VERSION_V1: u32 = 1;

/// Newest format version this reader accepts (and the one the writer emits)
pub const CURRENT_FORMAT_VERSION: u32 = 2;

/// Size of the fixed file header
pub const TRACE_HEADER_SIZE: usize = 96;

/// Number of tracer descriptor slots in the header
pub const MAX_TRACERS: usize = 16;

/// Size of one GPU info record
pub const GPU_INFO_SIZE: usize = 16;

/// Size of the packet envelope, including the 8-byte size prefix
///
/// size (8) + global index (8) + tracer (1) + reserved (1) + packet id (2)
/// + thread (4) + four timestamps (32) + buffers offset (8)
pub const PACKET_ENVELOPE_SIZE: usize = 64;

/// Size of the length prefix in front of every packet
pub const PACKET_SIZE_PREFIX: usize = 8;

/// First packet ID that belongs to an API plugin rather than the container
pub const FIRST_API_PACKET_ID: u16 = 7;

/// Identifier of the API a packet was captured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TracerId(pub u8);

impl TracerId {
    /// Reserved slot, never carries packets
    pub const RESERVED: TracerId = TracerId(0);
    /// OpenGL frame-rate tracer
    pub const GL_FPS: TracerId = TracerId(1);
    /// Vulkan API tracer
    pub const VULKAN: TracerId = TracerId(2);
    /// Vulkan frame-rate tracer
    pub const VULKAN_FPS: TracerId = TracerId(3);
}

impl fmt::Display for TracerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags::bitflags! {
    /// Per-tracer capabilities declared in the header
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TracerFlags: u8 {
        /// Packets from this tracer must be executed by a replayer
        const NEEDS_REPLAYER = 0b0000_0001;
        /// Tracer captured a 64-bit process
        const CAPTURED_64_BIT = 0b0000_0010;
    }
}

/// One tracer slot from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracerDescriptor {
    pub id: TracerId,
    pub flags: TracerFlags,
}

impl TracerDescriptor {
    /// Whether the tracer asks for a replayer at playback time
    pub fn needs_replayer(&self) -> bool {
        self.flags.contains(TracerFlags::NEEDS_REPLAYER)
    }
}

/// GPU the trace was captured on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuInfo {
    pub gpu_id: u64,
    pub driver_version: u64,
}

/// Parsed file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHeader {
    pub format_version: u32,
    pub uuid: [u8; 16],
    /// Byte offset of the first packet's size prefix
    pub first_packet_offset: u64,
    pub trace_start_time: u64,
    /// Pointer width of the captured process, in bytes
    pub pointer_size: u8,
    pub tracers: Vec<TracerDescriptor>,
    pub gpus: Vec<GpuInfo>,
}

impl TraceHeader {
    /// Offset right after the GPU info array; packets may not start before it
    pub fn gpu_array_end(&self) -> u64 {
        (TRACE_HEADER_SIZE + self.gpus.len() * GPU_INFO_SIZE) as u64
    }

    /// Distinct tracer IDs in header order
    pub fn tracer_ids(&self) -> Vec<TracerId> {
        let mut ids: Vec<TracerId> = Vec::with_capacity(self.tracers.len());
        for tracer in &self.tracers {
            if !ids.contains(&tracer.id) {
                ids.push(tracer.id);
            }
        }
        ids
    }
}

/// Packet kinds understood by the container itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Log message captured alongside the API calls
    Message,
    Checkpoint,
    ApiBoundary,
    GroupBegin,
    GroupEnd,
    TerminateProcess,
    /// Trailing portability table, dropped during indexing
    PortabilityTable,
    /// Anything owned by an API plugin
    Api(u16),
}

impl PacketKind {
    pub fn from_id(packet_id: u16) -> Self {
        match packet_id {
            0 => Self::Message,
            1 => Self::Checkpoint,
            2 => Self::ApiBoundary,
            3 => Self::GroupBegin,
            4 => Self::GroupEnd,
            5 => Self::TerminateProcess,
            6 => Self::PortabilityTable,
            other => Self::Api(other),
        }
    }

    pub fn id(self) -> u16 {
        match self {
            Self::Message => 0,
            Self::Checkpoint => 1,
            Self::ApiBoundary => 2,
            Self::GroupBegin => 3,
            Self::GroupEnd => 4,
            Self::TerminateProcess => 5,
            Self::PortabilityTable => 6,
            Self::Api(id) => id,
        }
    }

    /// Whether this kind needs an API plugin to decode
    pub fn is_api(self) -> bool {
        matches!(self, Self::Api(_))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Message => "Message",
            Self::Checkpoint => "Checkpoint",
            Self::ApiBoundary => "ApiBoundary",
            Self::GroupBegin => "GroupBegin",
            Self::GroupEnd => "GroupEnd",
            Self::TerminateProcess => "TerminateProcess",
            Self::PortabilityTable => "PortabilityTable",
            Self::Api(_) => "Api",
        }
    }
}

/// Severity carried by message packets and plugin log callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warning,
    Info,
    Verbose,
    Debug,
}

impl LogLevel {
    /// Decode the on-disk level; unknown values clamp to `Debug`
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Error,
            1 => Self::Warning,
            2 => Self::Info,
            3 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Self::Error => 0,
            Self::Warning => 1,
            Self::Info => 2,
            Self::Verbose => 3,
            Self::Debug => 4,
        }
    }

    /// Whether a message at `self` passes a filter set to `max`
    pub fn is_enabled_at(self, max: LogLevel) -> bool {
        self <= max
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Verbose => "verbose",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_kind_ids_roundtrip() {
        for id in 0..12u16 {
            assert_eq!(PacketKind::from_id(id).id(), id);
        }
        assert!(PacketKind::from_id(FIRST_API_PACKET_ID).is_api());
        assert!(!PacketKind::from_id(FIRST_API_PACKET_ID - 1).is_api());
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error.is_enabled_at(LogLevel::Warning));
        assert!(LogLevel::Warning.is_enabled_at(LogLevel::Warning));
        assert!(!LogLevel::Verbose.is_enabled_at(LogLevel::Warning));
        assert_eq!(LogLevel::from_raw(99), LogLevel::Debug);
    }

    #[test]
    fn test_tracer_ids_are_distinct() {
        let header = TraceHeader {
            format_version: CURRENT_FORMAT_VERSION,
            uuid: [0; 16],
            first_packet_offset: 0,
            trace_start_time: 0,
            pointer_size: 8,
            tracers: vec![
                TracerDescriptor {
                    id: TracerId::VULKAN,
                    flags: TracerFlags::NEEDS_REPLAYER,
                },
                TracerDescriptor {
                    id: TracerId::VULKAN,
                    flags: TracerFlags::empty(),
                },
                TracerDescriptor {
                    id: TracerId::GL_FPS,
                    flags: TracerFlags::empty(),
                },
            ],
            gpus: vec![GpuInfo {
                gpu_id: 1,
                driver_version: 2,
            }],
        };
        assert_eq!(header.tracer_ids(), vec![TracerId::VULKAN, TracerId::GL_FPS]);
        assert_eq!(header.gpu_array_end(), (TRACE_HEADER_SIZE + GPU_INFO_SIZE) as u64);
    }
}
