//! Shared test utilities for unit tests

use std::borrow::Cow;
use std::cell::Cell;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use hashbrown::HashMap;

use crate::plugin::loader::detached_handle;
use crate::plugin::{
    Controller, DecodeContext, DecodedPacket, Diagnostic, DiagnosticCallback, LogCallback,
    PluginSetting, ReplayOptions, ReplayStatus, Replayer, ReplayerSet, SurfaceTarget,
};
use crate::replay::LogSink;
use crate::trace::{
    GpuInfo, LogLevel, PacketBuilder, PacketKind, PacketRecord, TraceHeader, TraceReader,
    TraceSession, TraceWriter, TracerDescriptor, TracerFlags, TracerId,
};

// ============================================================================
// Trace builders
// ============================================================================

/// One packet of a test trace
#[derive(Debug, Clone, Copy)]
pub enum TraceItem {
    Message(LogLevel, &'static str),
    Marker(PacketKind),
    Api(TracerId, u16),
}

/// Header with a Vulkan tracer that needs a replayer and a GL frame-rate tracer that doesn't
pub fn test_header() -> TraceHeader {
    TraceHeader::new(
        vec![
            TracerDescriptor {
                id: TracerId::VULKAN,
                flags: TracerFlags::NEEDS_REPLAYER | TracerFlags::CAPTURED_64_BIT,
            },
            TracerDescriptor {
                id: TracerId::GL_FPS,
                flags: TracerFlags::empty(),
            },
        ],
        vec![GpuInfo {
            gpu_id: 0x1002_73bf,
            driver_version: 0x0002_0000,
        }],
    )
}

/// Encode the items into trace bytes, ending with a portability table
pub fn build_trace_bytes(items: &[TraceItem]) -> Vec<u8> {
    let mut writer = TraceWriter::new(Cursor::new(Vec::new()), &test_header()).unwrap();
    for item in items {
        match *item {
            TraceItem::Message(level, text) => {
                writer.write_message(level, text).unwrap();
            }
            TraceItem::Marker(kind) => {
                writer.write_marker(kind).unwrap();
            }
            TraceItem::Api(tracer, packet_id) => {
                writer
                    .write_packet(&PacketBuilder::api(tracer, packet_id, vec![0xAB; 8]))
                    .unwrap();
            }
        }
    }
    writer.finish(true).unwrap().into_inner()
}

/// Build and index a trace in memory
pub fn build_session(items: &[TraceItem]) -> TraceSession {
    TraceReader::new(Cursor::new(build_trace_bytes(items)))
        .index()
        .unwrap()
}

/// `count` Vulkan API packets
pub fn vulkan_session(count: usize) -> TraceSession {
    let items: Vec<TraceItem> = (0..count)
        .map(|i| TraceItem::Api(TracerId::VULKAN, 100 + i as u16))
        .collect();
    build_session(&items)
}

// ============================================================================
// Log sink
// ============================================================================

/// Sink that remembers every entry
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<(LogLevel, Option<u64>, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<(LogLevel, Option<u64>, String)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _, _)| *l == level)
            .count()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, level: LogLevel, global_index: Option<u64>, message: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((level, global_index, message.to_string()));
    }
}

pub fn recording_sink() -> Arc<dyn LogSink> {
    RecordingSink::new()
}

// ============================================================================
// Mock plugins
// ============================================================================

/// Payload produced by the mock decoders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub global_index: u64,
    pub packet_id: u16,
    pub format_version: u32,
}

fn decode_mock(record: &PacketRecord, ctx: &DecodeContext) -> Option<DecodedPacket> {
    if record.packet_id == MockController::UNKNOWN_PACKET {
        return None;
    }
    Some(DecodedPacket::new(
        record.packet_id,
        format!("call_{}", record.packet_id),
        MockCall {
            global_index: record.global_index,
            packet_id: record.packet_id,
            format_version: ctx.format_version,
        },
    ))
}

pub struct MockController {
    tracer: TracerId,
}

impl MockController {
    pub const TRACER: TracerId = TracerId::VULKAN;
    /// Packet ID the mock decoders refuse
    pub const UNKNOWN_PACKET: u16 = 0x7FFF;

    pub fn new(tracer: TracerId) -> Self {
        Self { tracer }
    }
}

impl Controller for MockController {
    fn tracer_id(&self) -> TracerId {
        self.tracer
    }

    fn interpret(&self, record: &PacketRecord, ctx: &DecodeContext) -> Option<DecodedPacket> {
        decode_mock(record, ctx)
    }

    fn describe(&self, packet: &DecodedPacket) -> String {
        match packet.payload::<MockCall>() {
            Some(call) => format!("{}(global {})", packet.name, call.global_index),
            None => packet.name.to_string(),
        }
    }

    fn packet_name(&self, packet_id: u16) -> Option<Cow<'static, str>> {
        (packet_id != Self::UNKNOWN_PACKET).then(|| format!("call_{packet_id}").into())
    }
}

/// What a mock replayer has been asked to do
#[derive(Debug, Default)]
pub struct MockJournal {
    pub replayed: Vec<u64>,
    pub initialized: bool,
    pub deinitialized: bool,
    pub log_level: Option<LogLevel>,
}

pub struct MockReplayer {
    tracer: TracerId,
    journal: Arc<Mutex<MockJournal>>,
    statuses: HashMap<u64, ReplayStatus>,
    panic_on: Option<u64>,
    delay: Duration,
    init_result: Result<(), i32>,
    settings: Vec<PluginSetting>,
    log: Option<LogCallback>,
    diagnostics: Option<DiagnosticCallback>,
}

impl MockReplayer {
    pub fn new(tracer: TracerId) -> Self {
        Self {
            tracer,
            journal: Arc::default(),
            statuses: HashMap::new(),
            panic_on: None,
            delay: Duration::ZERO,
            init_result: Ok(()),
            settings: Vec::new(),
            log: None,
            diagnostics: None,
        }
    }

    pub fn journal(&self) -> Arc<Mutex<MockJournal>> {
        Arc::clone(&self.journal)
    }

    /// Return `status` for the packet with this global index
    pub fn with_status(mut self, global_index: u64, status: ReplayStatus) -> Self {
        self.statuses.insert(global_index, status);
        self
    }

    pub fn panicking_on(mut self, global_index: u64) -> Self {
        self.panic_on = Some(global_index);
        self
    }

    /// Sleep this long inside every replay call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_init(mut self, status: i32) -> Self {
        self.init_result = Err(status);
        self
    }

    pub fn into_set(self) -> ReplayerSet {
        let mut set = ReplayerSet::new();
        set.insert(detached_handle(
            "mock_replay",
            Box::new(self) as Box<dyn Replayer>,
            destroy_mock_replayer,
        ));
        set
    }
}

impl Replayer for MockReplayer {
    fn tracer_id(&self) -> TracerId {
        self.tracer
    }

    fn interpret(&self, record: &PacketRecord, ctx: &DecodeContext) -> Option<DecodedPacket> {
        decode_mock(record, ctx)
    }

    fn replay(&mut self, packet: &DecodedPacket) -> ReplayStatus {
        let Some(call) = packet.payload::<MockCall>() else {
            return ReplayStatus::InvalidParams;
        };
        if self.panic_on == Some(call.global_index) {
            panic!("mock replayer exploded on packet {}", call.global_index);
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.journal.lock().unwrap().replayed.push(call.global_index);
        if let Some(diagnostics) = &self.diagnostics {
            diagnostics(&Diagnostic {
                level: LogLevel::Debug,
                global_index: Some(call.global_index),
                message: format!("replayed {}", packet.name),
            });
        }
        self.statuses
            .get(&call.global_index)
            .copied()
            .unwrap_or(ReplayStatus::Success)
    }

    fn initialize(
        &mut self,
        _surface: SurfaceTarget,
        _options: &ReplayOptions,
        _header: &TraceHeader,
    ) -> Result<(), i32> {
        self.journal.lock().unwrap().initialized = true;
        if let Some(log) = &self.log {
            log(LogLevel::Info, "mock device created");
        }
        self.init_result
    }

    fn deinitialize(&mut self) {
        count(|c| c.deinitialized += 1);
        self.journal.lock().unwrap().deinitialized = true;
    }

    fn set_log_callback(&mut self, callback: LogCallback) {
        self.log = Some(callback);
    }

    fn set_log_level(&mut self, level: LogLevel) {
        self.journal.lock().unwrap().log_level = Some(level);
    }

    fn register_diagnostic_callback(&mut self, callback: DiagnosticCallback) {
        self.diagnostics = Some(callback);
    }

    fn settings(&self) -> Vec<PluginSetting> {
        self.settings.clone()
    }

    fn update_from_settings(&mut self, settings: &[PluginSetting]) {
        self.settings = settings.to_vec();
    }
}

// ============================================================================
// Factory entrypoints
// ============================================================================

/// Instances created and destroyed through the factories on this thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PluginCounters {
    pub created: usize,
    pub destroyed: usize,
    pub deinitialized: usize,
}

thread_local! {
    static COUNTERS: Cell<PluginCounters> = const {
        Cell::new(PluginCounters { created: 0, destroyed: 0, deinitialized: 0 })
    };
}

fn count(update: impl FnOnce(&mut PluginCounters)) {
    COUNTERS.with(|c| {
        let mut counters = c.get();
        update(&mut counters);
        c.set(counters);
    });
}

pub fn reset_plugin_counters() {
    COUNTERS.with(|c| c.set(PluginCounters::default()));
}

pub fn plugin_counters() -> PluginCounters {
    COUNTERS.with(|c| c.get())
}

/// Errors reported by [`new_failing_replayer`]'s initialize
pub const FAILING_INIT_STATUS: i32 = -3;

pub fn new_mock_controller() -> Box<dyn Controller> {
    count(|c| c.created += 1);
    Box::new(MockController::new(MockController::TRACER))
}

/// Controller that claims the GL frame-rate tracer
pub fn new_gl_controller() -> Box<dyn Controller> {
    count(|c| c.created += 1);
    Box::new(MockController::new(TracerId::GL_FPS))
}

pub fn destroy_mock_controller(controller: Box<dyn Controller>) {
    count(|c| c.destroyed += 1);
    drop(controller);
}

pub fn new_mock_replayer() -> Box<dyn Replayer> {
    count(|c| c.created += 1);
    Box::new(MockReplayer::new(TracerId::VULKAN))
}

/// Replayer for the Vulkan frame-rate tracer whose initialize fails
pub fn new_failing_replayer() -> Box<dyn Replayer> {
    count(|c| c.created += 1);
    Box::new(MockReplayer::new(TracerId::VULKAN_FPS).failing_init(FAILING_INIT_STATUS))
}

pub fn destroy_mock_replayer(replayer: Box<dyn Replayer>) {
    count(|c| c.destroyed += 1);
    drop(replayer);
}
