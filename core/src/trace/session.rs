//! In-memory view of an indexed trace

use std::path::{Path, PathBuf};

use super::format::{PACKET_ENVELOPE_SIZE, PacketKind, TraceHeader, TracerId};

/// One packet from the stream, owning its complete encoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    /// Offset of the size prefix in the source file
    pub file_offset: u64,
    pub global_index: u64,
    pub tracer_id: TracerId,
    pub packet_id: u16,
    pub thread_id: u32,
    /// Tracer started handling the call
    pub capture_begin: u64,
    /// API entrypoint entered
    pub call_begin: u64,
    /// API entrypoint returned
    pub call_end: u64,
    /// Tracer finished handling the call
    pub capture_end: u64,
    /// Offset of auxiliary buffers inside the body (0 when absent)
    pub next_buffers_offset: u64,
    /// Size prefix + envelope + body, exactly as stored on disk
    pub(crate) bytes: Vec<u8>,
}

impl PacketRecord {
    pub fn kind(&self) -> PacketKind {
        PacketKind::from_id(self.packet_id)
    }

    /// The whole encoded frame
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Everything after the fixed envelope
    pub fn body(&self) -> &[u8] {
        &self.bytes[PACKET_ENVELOPE_SIZE..]
    }

    /// Total frame size including the prefix
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Time spent inside the traced entrypoint
    pub fn call_duration(&self) -> u64 {
        self.call_end.saturating_sub(self.call_begin)
    }

    /// Time spent in the tracer around the call
    pub fn capture_overhead(&self) -> u64 {
        self.capture_end
            .saturating_sub(self.capture_begin)
            .saturating_sub(self.call_duration())
    }
}

/// A trace file after indexing: header plus every addressable packet
#[derive(Debug, Clone)]
pub struct TraceSession {
    header: TraceHeader,
    path: Option<PathBuf>,
    packets: Vec<PacketRecord>,
}

impl TraceSession {
    pub(crate) fn new(header: TraceHeader, packets: Vec<PacketRecord>) -> Self {
        Self {
            header,
            path: None,
            packets,
        }
    }

    pub(crate) fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    pub fn header(&self) -> &TraceHeader {
        &self.header
    }

    /// Format version, for building a decode context
    pub fn format_version(&self) -> u32 {
        self.header.format_version
    }

    /// Source file, when the session was opened from disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn packets(&self) -> &[PacketRecord] {
        &self.packets
    }

    pub fn packet(&self, index: usize) -> Option<&PacketRecord> {
        self.packets.get(index)
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Array index of the packet with the given global index
    ///
    /// Global indices are strictly increasing, so this is a binary search.
    pub fn position_of(&self, global_index: u64) -> Option<usize> {
        self.packets
            .binary_search_by_key(&global_index, |p| p.global_index)
            .ok()
    }
}
