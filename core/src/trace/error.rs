//! Errors raised while loading a trace

use std::io;

use super::format::TracerId;

/// Malformed container structure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("not a trace file (bad magic {0:02x?})")]
    BadMagic([u8; 4]),

    #[error("unsupported trace format version {0}")]
    UnsupportedVersion(u32),

    #[error("header declares {0} tracers (at most 16 are allowed)")]
    TooManyTracers(u8),

    #[error("trace describes no GPUs")]
    NoGpuInfo,

    #[error("header declares {count} GPU records but the file ends at {file_len} bytes")]
    GpuInfoOutOfBounds { count: u32, file_len: u64 },

    #[error("first packet offset {offset} overlaps the header (must be >= {minimum})")]
    FirstPacketOffset { offset: u64, minimum: u64 },

    #[error("packet {index} at offset {offset} declares size {size}, smaller than its envelope")]
    InvalidPacketSize { index: usize, offset: u64, size: u64 },

    #[error("packet at offset {offset} has global index {found}, not after previous {previous}")]
    NonMonotonicIndex { offset: u64, previous: u64, found: u64 },
}

/// Failure to open, index or interpret a trace
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed trace: {0}")]
    Format(#[from] FormatError),

    #[error(
        "packet {index} at offset {offset} is truncated (expected {expected} bytes, {available} available)"
    )]
    TruncatedPacket {
        index: usize,
        offset: u64,
        expected: u64,
        available: u64,
    },

    #[error("packet {global_index} (tracer {tracer_id}, id {packet_id}) could not be decoded")]
    UnrecognizedPacket {
        global_index: u64,
        tracer_id: TracerId,
        packet_id: u16,
    },
}
