//! Packet interpretation
//!
//! Container-level packets (log messages and markers) are understood here
//! directly. Everything else is API-specific and goes to the controller
//! loaded for the packet's tracer.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::{Cursor, Read};

use crate::plugin::{Controller, DecodeContext, DecodedPacket};
use crate::trace::{LogLevel, PacketKind, PacketRecord, TraceError, TraceSession};

/// Built-in packets that carry no payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Checkpoint,
    ApiBoundary,
    GroupBegin,
    GroupEnd,
    TerminateProcess,
    /// Only seen here when it is not the final packet
    PortabilityTable,
}

impl MarkerKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Checkpoint => "Checkpoint",
            Self::ApiBoundary => "ApiBoundary",
            Self::GroupBegin => "GroupBegin",
            Self::GroupEnd => "GroupEnd",
            Self::TerminateProcess => "TerminateProcess",
            Self::PortabilityTable => "PortabilityTable",
        }
    }
}

/// Routing decision for a packet ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketClass {
    Message,
    Marker(MarkerKind),
    Api,
}

impl PacketClass {
    pub fn of(packet_id: u16) -> Self {
        match PacketKind::from_id(packet_id) {
            PacketKind::Message => Self::Message,
            PacketKind::Checkpoint => Self::Marker(MarkerKind::Checkpoint),
            PacketKind::ApiBoundary => Self::Marker(MarkerKind::ApiBoundary),
            PacketKind::GroupBegin => Self::Marker(MarkerKind::GroupBegin),
            PacketKind::GroupEnd => Self::Marker(MarkerKind::GroupEnd),
            PacketKind::TerminateProcess => Self::Marker(MarkerKind::TerminateProcess),
            PacketKind::PortabilityTable => Self::Marker(MarkerKind::PortabilityTable),
            PacketKind::Api(_) => Self::Api,
        }
    }
}

/// Text captured in a message packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub level: LogLevel,
    pub text: String,
}

impl LogMessage {
    /// Decode a message body; `None` if the declared length overruns the body
    pub fn decode(body: &[u8]) -> Option<Self> {
        let mut cursor = Cursor::new(body);
        let level = LogLevel::from_raw(cursor.read_u32::<LittleEndian>().ok()?);
        let len = cursor.read_u32::<LittleEndian>().ok()? as usize;

        let remaining = body.len() - cursor.position() as usize;
        if len > remaining {
            return None;
        }
        let mut text = vec![0u8; len];
        cursor.read_exact(&mut text).ok()?;

        Some(Self {
            level,
            text: String::from_utf8_lossy(&text).into_owned(),
        })
    }
}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.text)
    }
}

/// A packet after interpretation
#[derive(Debug)]
pub enum InterpretedPacket {
    Message(LogMessage),
    Marker(MarkerKind),
    Api(DecodedPacket),
}

impl InterpretedPacket {
    /// One-line description; API packets are described by their controller
    pub fn describe(&self, controller: Option<&dyn Controller>) -> String {
        match self {
            Self::Message(message) => message.to_string(),
            Self::Marker(kind) => kind.name().to_string(),
            Self::Api(packet) => match controller {
                Some(controller) => controller.describe(packet),
                None => packet.name.to_string(),
            },
        }
    }
}

fn unrecognized(record: &PacketRecord) -> TraceError {
    TraceError::UnrecognizedPacket {
        global_index: record.global_index,
        tracer_id: record.tracer_id,
        packet_id: record.packet_id,
    }
}

/// Interpret one packet
///
/// API packets need a controller serving the packet's tracer that understands
/// the packet ID; anything else is an [`TraceError::UnrecognizedPacket`].
pub fn interpret_packet(
    record: &PacketRecord,
    controller: Option<&dyn Controller>,
    ctx: &DecodeContext,
) -> Result<InterpretedPacket, TraceError> {
    match PacketClass::of(record.packet_id) {
        PacketClass::Message => LogMessage::decode(record.body())
            .map(InterpretedPacket::Message)
            .ok_or_else(|| unrecognized(record)),
        PacketClass::Marker(kind) => Ok(InterpretedPacket::Marker(kind)),
        PacketClass::Api => controller
            .filter(|c| c.tracer_id() == record.tracer_id)
            .and_then(|c| c.interpret(record, ctx))
            .map(InterpretedPacket::Api)
            .ok_or_else(|| unrecognized(record)),
    }
}

/// Interpret every packet of a session, failing on the first unrecognized one
pub fn interpret_session(
    session: &TraceSession,
    controller: Option<&dyn Controller>,
) -> Result<Vec<InterpretedPacket>, TraceError> {
    let ctx = DecodeContext::new(session.format_version());
    session
        .packets()
        .iter()
        .map(|record| interpret_packet(record, controller, &ctx))
        .collect()
}
