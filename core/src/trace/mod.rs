//! Trace container
//!
//! Reading, indexing and writing of captured API traces. A trace is a fixed
//! header, an array of GPU descriptions and a stream of length-prefixed packet
//! frames; see [`format`] for the exact layout.

pub mod error;
pub mod format;
pub mod reader;
pub mod session;
pub mod writer;

pub use error::{FormatError, TraceError};
pub use format::{
    CURRENT_FORMAT_VERSION, FIRST_API_PACKET_ID, GpuInfo, LogLevel, PACKET_ENVELOPE_SIZE,
    PacketKind, TraceHeader, TracerDescriptor, TracerFlags, TracerId,
};
pub use reader::{TraceReader, open_and_index};
pub use session::{PacketRecord, TraceSession};
pub use writer::{PacketBuilder, TraceWriter, encode_message_body};
