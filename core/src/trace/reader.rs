//! Trace container reader
//!
//! Indexing is two-pass: the first pass walks the size prefixes to count
//! frames, the second materializes every frame into its own buffer. Nothing is
//! returned unless both passes succeed.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, trace};

use super::error::{FormatError, TraceError};
use super::format::*;
use super::session::{PacketRecord, TraceSession};

/// Open a trace file and index every packet in it
pub fn open_and_index(path: impl AsRef<Path>) -> Result<TraceSession, TraceError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let session = TraceReader::new(BufReader::new(file)).index()?;
    debug!(
        "Indexed {} packets from {} (format v{})",
        session.len(),
        path.display(),
        session.format_version()
    );
    Ok(session.with_path(path))
}

/// Reader for the trace container
pub struct TraceReader<R> {
    reader: R,
}

impl<R: Read + Seek> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Parse the header and index the packet stream
    ///
    /// On success the underlying reader is left positioned at the first packet.
    pub fn index(&mut self) -> Result<TraceSession, TraceError> {
        let file_len = self.reader.seek(SeekFrom::End(0))?;
        self.reader.seek(SeekFrom::Start(0))?;

        let header = self.read_header(file_len)?;
        let first = header.first_packet_offset;

        let count = self.count_frames(first)?;
        trace!("Counted {} frames after offset {}", count, first);

        let mut packets = self.read_frames(first, count, file_len)?;
        if packets
            .last()
            .is_some_and(|p| p.kind() == PacketKind::PortabilityTable)
        {
            packets.pop();
            trace!("Dropped trailing portability table");
        }

        self.reader.seek(SeekFrom::Start(first))?;
        Ok(TraceSession::new(header, packets))
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the fixed header and the GPU info array
    fn read_header(&mut self, file_len: u64) -> Result<TraceHeader, TraceError> {
        let mut magic = [0u8; 4];
        self.reader.read_exact(&mut magic)?;
        if magic != TRACE_MAGIC {
            return Err(FormatError::BadMagic(magic).into());
        }

        let format_version = self.reader.read_u32::<LittleEndian>()?;
        if !(FORMAT_VERSION_V1..=CURRENT_FORMAT_VERSION).contains(&format_version) {
            return Err(FormatError::UnsupportedVersion(format_version).into());
        }

        let mut uuid = [0u8; 16];
        self.reader.read_exact(&mut uuid)?;
        let first_packet_offset = self.reader.read_u64::<LittleEndian>()?;
        let trace_start_time = self.reader.read_u64::<LittleEndian>()?;
        let pointer_size = self.reader.read_u8()?;
        let tracer_count = self.reader.read_u8()?;
        let mut reserved = [0u8; 2];
        self.reader.read_exact(&mut reserved)?;

        let mut slots = [0u8; MAX_TRACERS * 2];
        self.reader.read_exact(&mut slots)?;
        if tracer_count as usize > MAX_TRACERS {
            return Err(FormatError::TooManyTracers(tracer_count).into());
        }

        let gpu_count = self.reader.read_u32::<LittleEndian>()?;
        let mut reserved = [0u8; 16];
        self.reader.read_exact(&mut reserved)?;

        // Nothing is allocated before this check
        if gpu_count == 0 {
            return Err(FormatError::NoGpuInfo.into());
        }
        let tracers = slots
            .chunks_exact(2)
            .take(tracer_count as usize)
            .map(|slot| TracerDescriptor {
                id: TracerId(slot[0]),
                flags: TracerFlags::from_bits_truncate(slot[1]),
            })
            .collect();

        let gpu_bytes_len = gpu_count as u64 * GPU_INFO_SIZE as u64;
        if TRACE_HEADER_SIZE as u64 + gpu_bytes_len > file_len {
            return Err(FormatError::GpuInfoOutOfBounds {
                count: gpu_count,
                file_len,
            }
            .into());
        }

        let mut gpu_bytes = vec![0u8; gpu_bytes_len as usize];
        self.reader.read_exact(&mut gpu_bytes)?;
        let mut cursor = Cursor::new(gpu_bytes.as_slice());
        let mut gpus = Vec::with_capacity(gpu_count as usize);
        for _ in 0..gpu_count {
            let gpu_id = cursor.read_u64::<LittleEndian>()?;
            let driver_version = cursor.read_u64::<LittleEndian>()?;
            gpus.push(GpuInfo {
                gpu_id,
                driver_version,
            });
        }

        let header = TraceHeader {
            format_version,
            uuid,
            first_packet_offset,
            trace_start_time,
            pointer_size,
            tracers,
            gpus,
        };
        if first_packet_offset < header.gpu_array_end() {
            return Err(FormatError::FirstPacketOffset {
                offset: first_packet_offset,
                minimum: header.gpu_array_end(),
            }
            .into());
        }
        Ok(header)
    }

    /// Pass 1: walk size prefixes until the stream runs out
    fn count_frames(&mut self, first: u64) -> Result<usize, TraceError> {
        self.reader.seek(SeekFrom::Start(first))?;

        let mut count = 0;
        let mut offset = first;
        while let Some(size) = read_size_prefix(&mut self.reader)? {
            if size < PACKET_ENVELOPE_SIZE as u64 {
                return Err(FormatError::InvalidPacketSize {
                    index: count,
                    offset,
                    size,
                }
                .into());
            }
            offset = offset.checked_add(size).ok_or(FormatError::InvalidPacketSize {
                index: count,
                offset,
                size,
            })?;
            self.reader.seek(SeekFrom::Start(offset))?;
            count += 1;
        }
        Ok(count)
    }

    /// Pass 2: read each counted frame into its own buffer
    fn read_frames(
        &mut self,
        first: u64,
        count: usize,
        file_len: u64,
    ) -> Result<Vec<PacketRecord>, TraceError> {
        self.reader.seek(SeekFrom::Start(first))?;

        let mut packets: Vec<PacketRecord> = Vec::with_capacity(count);
        let mut offset = first;
        for index in 0..count {
            let size = read_size_prefix(&mut self.reader)?.ok_or(TraceError::TruncatedPacket {
                index,
                offset,
                expected: PACKET_SIZE_PREFIX as u64,
                available: file_len.saturating_sub(offset),
            })?;

            // Checked against the envelope and file length before allocating the frame
            if size < PACKET_ENVELOPE_SIZE as u64 {
                return Err(FormatError::InvalidPacketSize {
                    index,
                    offset,
                    size,
                }
                .into());
            }
            let available = file_len.saturating_sub(offset);
            if size > available {
                return Err(TraceError::TruncatedPacket {
                    index,
                    offset,
                    expected: size,
                    available,
                });
            }

            let mut bytes = vec![0u8; size as usize];
            bytes[..PACKET_SIZE_PREFIX].copy_from_slice(&size.to_le_bytes());
            if let Err(err) = self.reader.read_exact(&mut bytes[PACKET_SIZE_PREFIX..]) {
                return Err(match err.kind() {
                    io::ErrorKind::UnexpectedEof => TraceError::TruncatedPacket {
                        index,
                        offset,
                        expected: size,
                        available,
                    },
                    _ => err.into(),
                });
            }

            let record = parse_envelope(index, offset, bytes)?;
            if let Some(previous) = packets.last()
                && record.global_index <= previous.global_index
            {
                return Err(FormatError::NonMonotonicIndex {
                    offset,
                    previous: previous.global_index,
                    found: record.global_index,
                }
                .into());
            }

            packets.push(record);
            offset += size;
        }
        Ok(packets)
    }
}

/// Read an 8-byte size prefix; `None` on a short read at end of stream
fn read_size_prefix<R: Read>(reader: &mut R) -> Result<Option<u64>, TraceError> {
    let mut buf = [0u8; PACKET_SIZE_PREFIX];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(None),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(u64::from_le_bytes(buf)))
}

/// Decode the fixed envelope that follows the size prefix
fn parse_envelope(
    index: usize,
    file_offset: u64,
    bytes: Vec<u8>,
) -> Result<PacketRecord, TraceError> {
    if bytes.len() < PACKET_ENVELOPE_SIZE {
        return Err(FormatError::InvalidPacketSize {
            index,
            offset: file_offset,
            size: bytes.len() as u64,
        }
        .into());
    }

    let mut cursor = Cursor::new(&bytes[PACKET_SIZE_PREFIX..PACKET_ENVELOPE_SIZE]);
    let global_index = cursor.read_u64::<LittleEndian>()?;
    let tracer_id = TracerId(cursor.read_u8()?);
    let _reserved = cursor.read_u8()?;
    let packet_id = cursor.read_u16::<LittleEndian>()?;
    let thread_id = cursor.read_u32::<LittleEndian>()?;
    let capture_begin = cursor.read_u64::<LittleEndian>()?;
    let call_begin = cursor.read_u64::<LittleEndian>()?;
    let call_end = cursor.read_u64::<LittleEndian>()?;
    let capture_end = cursor.read_u64::<LittleEndian>()?;
    let next_buffers_offset = cursor.read_u64::<LittleEndian>()?;

    Ok(PacketRecord {
        file_offset,
        global_index,
        tracer_id,
        packet_id,
        thread_id,
        capture_begin,
        call_begin,
        call_end,
        capture_end,
        next_buffers_offset,
        bytes,
    })
}
