//! Trace container writer
//!
//! Emits files in the layout described in [`super::format`]. Used by capture
//! tooling and by tests that need fixture traces.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Read, Write};

use super::format::*;

impl TraceHeader {
    /// Header for a new capture at the current format version
    ///
    /// The first packet is placed directly after the GPU info array.
    pub fn new(tracers: Vec<TracerDescriptor>, gpus: Vec<GpuInfo>) -> Self {
        let mut header = Self {
            format_version: CURRENT_FORMAT_VERSION,
            uuid: [0; 16],
            first_packet_offset: 0,
            trace_start_time: 0,
            pointer_size: 8,
            tracers,
            gpus,
        };
        header.first_packet_offset = header.gpu_array_end();
        header
    }
}

/// A packet waiting to be written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketBuilder {
    pub tracer_id: u8,
    pub packet_id: u16,
    pub thread_id: u32,
    /// Explicit global index; `None` continues from the previous packet
    pub global_index: Option<u64>,
    /// capture begin, call begin, call end, capture end
    pub timing: [u64; 4],
    pub next_buffers_offset: u64,
    pub body: Vec<u8>,
}

impl PacketBuilder {
    /// An API call packet for the given tracer
    pub fn api(tracer_id: TracerId, packet_id: u16, body: Vec<u8>) -> Self {
        Self {
            tracer_id: tracer_id.0,
            packet_id,
            body,
            ..Default::default()
        }
    }

    /// A container-level packet (message, marker or portability table)
    pub fn builtin(kind: PacketKind, body: Vec<u8>) -> Self {
        Self {
            packet_id: kind.id(),
            body,
            ..Default::default()
        }
    }

    pub fn with_thread(mut self, thread_id: u32) -> Self {
        self.thread_id = thread_id;
        self
    }

    pub fn with_global_index(mut self, global_index: u64) -> Self {
        self.global_index = Some(global_index);
        self
    }

    pub fn with_timing(
        mut self,
        capture_begin: u64,
        call_begin: u64,
        call_end: u64,
        capture_end: u64,
    ) -> Self {
        self.timing = [capture_begin, call_begin, call_end, capture_end];
        self
    }
}

/// Encode a message packet body
pub fn encode_message_body(level: LogLevel, text: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(8 + text.len());
    body.extend_from_slice(&level.to_raw().to_le_bytes());
    body.extend_from_slice(&(text.len() as u32).to_le_bytes());
    body.extend_from_slice(text.as_bytes());
    body
}

/// Writer for the trace container
pub struct TraceWriter<W: Write> {
    writer: W,
    next_global_index: u64,
    packets_written: usize,
}

impl<W: Write> TraceWriter<W> {
    /// Write the header, GPU array and padding, ready for packets
    pub fn new(mut writer: W, header: &TraceHeader) -> io::Result<Self> {
        if header.tracers.len() > MAX_TRACERS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("at most {} tracers can be recorded", MAX_TRACERS),
            ));
        }

        let first_packet_offset = header.first_packet_offset.max(header.gpu_array_end());

        writer.write_all(&TRACE_MAGIC)?;
        writer.write_u32::<LittleEndian>(header.format_version)?;
        writer.write_all(&header.uuid)?;
        writer.write_u64::<LittleEndian>(first_packet_offset)?;
        writer.write_u64::<LittleEndian>(header.trace_start_time)?;
        writer.write_u8(header.pointer_size)?;
        writer.write_u8(header.tracers.len() as u8)?;
        writer.write_all(&[0u8; 2])?;
        for slot in 0..MAX_TRACERS {
            match header.tracers.get(slot) {
                Some(tracer) => {
                    writer.write_u8(tracer.id.0)?;
                    writer.write_u8(tracer.flags.bits())?;
                }
                None => writer.write_all(&[0u8; 2])?,
            }
        }
        writer.write_u32::<LittleEndian>(header.gpus.len() as u32)?;
        writer.write_all(&[0u8; 16])?;

        for gpu in &header.gpus {
            writer.write_u64::<LittleEndian>(gpu.gpu_id)?;
            writer.write_u64::<LittleEndian>(gpu.driver_version)?;
        }

        let padding = first_packet_offset - header.gpu_array_end();
        io::copy(&mut io::repeat(0).take(padding), &mut writer)?;

        Ok(Self {
            writer,
            next_global_index: 0,
            packets_written: 0,
        })
    }

    /// Append one packet, returning the global index it was written with
    pub fn write_packet(&mut self, packet: &PacketBuilder) -> io::Result<u64> {
        let global_index = packet.global_index.unwrap_or(self.next_global_index);
        let size = (PACKET_ENVELOPE_SIZE + packet.body.len()) as u64;

        self.writer.write_u64::<LittleEndian>(size)?;
        self.writer.write_u64::<LittleEndian>(global_index)?;
        self.writer.write_u8(packet.tracer_id)?;
        self.writer.write_u8(0)?;
        self.writer.write_u16::<LittleEndian>(packet.packet_id)?;
        self.writer.write_u32::<LittleEndian>(packet.thread_id)?;
        for stamp in packet.timing {
            self.writer.write_u64::<LittleEndian>(stamp)?;
        }
        self.writer.write_u64::<LittleEndian>(packet.next_buffers_offset)?;
        self.writer.write_all(&packet.body)?;

        self.next_global_index = global_index + 1;
        self.packets_written += 1;
        Ok(global_index)
    }

    /// Append a log message packet
    pub fn write_message(&mut self, level: LogLevel, text: &str) -> io::Result<u64> {
        self.write_packet(&PacketBuilder::builtin(
            PacketKind::Message,
            encode_message_body(level, text),
        ))
    }

    /// Append a body-less marker packet
    pub fn write_marker(&mut self, kind: PacketKind) -> io::Result<u64> {
        self.write_packet(&PacketBuilder::builtin(kind, Vec::new()))
    }

    pub fn packets_written(&self) -> usize {
        self.packets_written
    }

    /// Flush, optionally appending the portability table trailer
    pub fn finish(mut self, portability_table: bool) -> io::Result<W> {
        if portability_table {
            // Empty table: a count of zero entries
            self.write_packet(&PacketBuilder::builtin(
                PacketKind::PortabilityTable,
                0u64.to_le_bytes().to_vec(),
            ))?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}
