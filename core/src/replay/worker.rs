//! Replay worker thread
//!
//! Owns the packet walk and every call into a replayer. The control side only
//! talks to it through [`Command`]s and the shared [`ControlFlags`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::interpret::{LogMessage, PacketClass};
use crate::plugin::{DecodeContext, ReplayStatus, ReplayerSet, StatusClass};
use crate::trace::{LogLevel, PacketRecord, TraceSession};

use super::control::ControlFlags;
use super::events::{EngineState, ReplayEvent};
use super::sink::LogSink;

/// Requests the control side queues for the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// Run from the first packet
    Start,
    /// Run from the packet after the one we paused on
    Continue,
    /// Run from the first packet once the stopping run has ended, pausing
    /// after `breakpoint`
    Restart { breakpoint: u64 },
}

/// What happened to one packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketOutcome {
    Executed(StatusClass),
    /// No replayer for the packet's tracer
    Skipped,
    Marker,
    Message,
    /// The replayer panicked
    CallFailed(String),
}

/// Per-outcome counts for the current or last run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub executed: usize,
    pub skipped: usize,
    pub markers: usize,
    pub messages: usize,
    pub hard_failures: usize,
    pub divergences: usize,
    pub suppressed: usize,
    pub unknown: usize,
    pub call_failures: usize,
}

impl ReplaySummary {
    fn record(&mut self, outcome: &PacketOutcome) {
        match outcome {
            PacketOutcome::Executed(class) => {
                self.executed += 1;
                match class {
                    StatusClass::Success => {}
                    StatusClass::HardFailure => self.hard_failures += 1,
                    StatusClass::Divergence => self.divergences += 1,
                    StatusClass::Suppressed => self.suppressed += 1,
                    StatusClass::Unknown => self.unknown += 1,
                }
            }
            PacketOutcome::Skipped => self.skipped += 1,
            PacketOutcome::Marker => self.markers += 1,
            PacketOutcome::Message => self.messages += 1,
            PacketOutcome::CallFailed(_) => self.call_failures += 1,
        }
    }
}

/// A loaded trace and the replayers that execute it
pub(crate) struct ReplayState {
    pub session: Arc<TraceSession>,
    pub replayers: ReplayerSet,
    pub ctx: DecodeContext,
    /// Array index of the next (or paused-on) packet
    pub index: usize,
    pub last_global: Option<u64>,
    pub summary: ReplaySummary,
}

impl ReplayState {
    pub fn new(session: Arc<TraceSession>, replayers: ReplayerSet) -> Self {
        Self {
            ctx: DecodeContext::new(session.format_version()),
            session,
            replayers,
            index: 0,
            last_global: None,
            summary: ReplaySummary::default(),
        }
    }

    /// Back to the first packet
    pub fn rewind(&mut self) {
        self.index = 0;
        self.last_global = None;
    }
}

pub(crate) type SharedState = Arc<Mutex<Option<ReplayState>>>;

pub(crate) fn lock_state(state: &SharedState) -> MutexGuard<'_, Option<ReplayState>> {
    state.lock().unwrap_or_else(|e| {
        warn!("Replay state mutex poisoned; continuing");
        e.into_inner()
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Execute one packet against the loaded replayers
pub(crate) fn execute_packet(
    record: &PacketRecord,
    replayers: &mut ReplayerSet,
    ctx: &DecodeContext,
    sink: &dyn LogSink,
) -> PacketOutcome {
    let global = Some(record.global_index);

    match PacketClass::of(record.packet_id) {
        PacketClass::Marker(kind) => {
            trace!("Marker {} at packet {}", kind.name(), record.global_index);
            PacketOutcome::Marker
        }
        PacketClass::Message => {
            match LogMessage::decode(record.body()) {
                Some(message) => sink.log(message.level, global, &message.text),
                None => sink.log(LogLevel::Warning, global, "malformed message packet"),
            }
            PacketOutcome::Message
        }
        PacketClass::Api => {
            let Some(replayer) = replayers.get_mut(record.tracer_id) else {
                sink.log(
                    LogLevel::Warning,
                    global,
                    &format!(
                        "no replayer loaded for tracer {}; skipping packet id {}",
                        record.tracer_id, record.packet_id
                    ),
                );
                return PacketOutcome::Skipped;
            };

            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                match replayer.interpret(record, ctx) {
                    Some(packet) => replayer.replay(&packet),
                    None => ReplayStatus::InvalidId,
                }
            }));

            let status = match result {
                Ok(status) => status,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    sink.log(
                        LogLevel::Error,
                        global,
                        &format!(
                            "replayer panicked on packet id {}: {}",
                            record.packet_id, message
                        ),
                    );
                    return PacketOutcome::CallFailed(message);
                }
            };

            let class = status.classify();
            let level = match class {
                StatusClass::Success => None,
                StatusClass::HardFailure | StatusClass::Unknown => Some(LogLevel::Error),
                StatusClass::Divergence => Some(LogLevel::Warning),
                StatusClass::Suppressed => Some(LogLevel::Debug),
            };
            if let Some(level) = level {
                sink.log(
                    level,
                    global,
                    &format!("packet id {}: {}", record.packet_id, status.description()),
                );
            }
            PacketOutcome::Executed(class)
        }
    }
}

pub(crate) struct Worker {
    pub commands: Receiver<Command>,
    pub events: Sender<ReplayEvent>,
    pub flags: Arc<ControlFlags>,
    pub state: SharedState,
    pub sink: Arc<dyn LogSink>,
}

impl Worker {
    pub fn run(self) {
        debug!("Replay worker started");

        while let Ok(command) = self.commands.recv() {
            if self.flags.is_shutting_down() {
                break;
            }
            self.walk(command);
        }

        debug!("Replay worker exiting");
    }

    fn emit(&self, event: ReplayEvent) {
        // The receiver may be gone; the walk continues regardless
        let _ = self.events.send(event);
    }

    /// End the run and rewind
    fn finish_run(&self, state: &mut ReplayState, end: EngineState) {
        let last = state.last_global;
        state.rewind();
        self.flags.set_position(None);
        self.flags.disarm_breakpoint();
        self.flags.set_state(end);
        self.emit(match end {
            EngineState::Finished => ReplayEvent::Finished { global_index: last },
            _ => ReplayEvent::Stopped { global_index: last },
        });
    }

    fn walk(&self, command: Command) {
        let mut guard = lock_state(&self.state);
        let Some(state) = guard.as_mut() else {
            warn!("Replay command {:?} with no trace loaded", command);
            self.flags.set_state(EngineState::Idle);
            return;
        };

        match command {
            Command::Start | Command::Restart { .. } => {
                if let Command::Restart { breakpoint } = command {
                    self.flags.clear_requests();
                    self.flags.arm_breakpoint(breakpoint);
                    self.flags.set_state(EngineState::Playing);
                }
                state.rewind();
                state.summary = ReplaySummary::default();
                self.flags.set_position(None);
                debug!("Replay started ({} packets)", state.session.len());
                self.emit(ReplayEvent::Started);
            }
            Command::Continue => {
                state.index += 1;
                debug!("Replay continued at index {}", state.index);
                self.emit(ReplayEvent::Continued);
            }
        }

        let session = Arc::clone(&state.session);
        loop {
            if self.flags.take_stop() {
                debug!("Replay stopped at index {}", state.index);
                self.finish_run(state, EngineState::Idle);
                return;
            }

            let Some(record) = session.packet(state.index) else {
                debug!("Replay finished");
                self.finish_run(state, EngineState::Finished);
                return;
            };

            self.emit(ReplayEvent::Progress { index: state.index });
            let outcome =
                execute_packet(record, &mut state.replayers, &state.ctx, self.sink.as_ref());
            state.summary.record(&outcome);
            state.last_global = Some(record.global_index);
            self.flags.set_position(state.last_global);

            let at_breakpoint = self.flags.hit_breakpoint(record.global_index);
            if self.flags.take_pause() || at_breakpoint {
                if self.flags.transition(EngineState::Playing, EngineState::Paused) {
                    debug!("Replay paused after packet {}", record.global_index);
                    self.emit(ReplayEvent::Paused {
                        global_index: record.global_index,
                    });
                    return;
                }
                // Lost the race against a stop request; the next iteration handles it
                continue;
            }

            state.index += 1;
        }
    }
}
