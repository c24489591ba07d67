//! Replay engine control surface

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use crate::plugin::ReplayerSet;
use crate::trace::TraceSession;

use super::control::ControlFlags;
use super::error::EngineError;
use super::events::{EngineState, ReplayEvent};
use super::sink::LogSink;
use super::worker::{Command, ReplayState, ReplaySummary, SharedState, Worker, lock_state};

/// Drives sequential replay of a loaded trace on a dedicated worker thread
///
/// Control methods return immediately; progress is reported through the
/// event receiver returned by [`ReplayEngine::new`].
pub struct ReplayEngine {
    flags: Arc<ControlFlags>,
    state: SharedState,
    /// Option so Drop can disconnect the worker before joining it
    commands: Option<Sender<Command>>,
    events: Sender<ReplayEvent>,
    worker: Option<JoinHandle<()>>,
}

impl ReplayEngine {
    /// Spawn the worker and hand back the event stream
    pub fn new(sink: Arc<dyn LogSink>) -> (Self, Receiver<ReplayEvent>) {
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let flags = Arc::new(ControlFlags::default());
        let state: SharedState = Arc::new(Mutex::new(None));

        let worker = Worker {
            commands: command_rx,
            events: event_tx.clone(),
            flags: Arc::clone(&flags),
            state: Arc::clone(&state),
            sink,
        };
        let handle = thread::Builder::new()
            .name("replay-worker".into())
            .spawn(move || worker.run())
            .expect("failed to spawn replay worker thread");

        let engine = Self {
            flags,
            state,
            commands: Some(command_tx),
            events: event_tx,
            worker: Some(handle),
        };
        (engine, event_rx)
    }

    pub fn state(&self) -> EngineState {
        self.flags.state()
    }

    /// Global index of the last executed packet in the current run
    pub fn position(&self) -> Option<u64> {
        self.flags.position()
    }

    pub fn breakpoint(&self) -> Option<u64> {
        self.flags.breakpoint()
    }

    pub fn is_loaded(&self) -> bool {
        lock_state(&self.state).is_some()
    }

    /// Outcome counts of the current or last run
    ///
    /// Blocks while the worker is walking packets.
    pub fn summary(&self) -> Option<ReplaySummary> {
        lock_state(&self.state).as_ref().map(|s| s.summary)
    }

    fn ensure_not_running(&self) -> Result<(), EngineError> {
        let state = self.state();
        if state.is_active() {
            return Err(EngineError::Busy(state));
        }
        Ok(())
    }

    /// Install a trace and its replayers, replacing any previous one
    pub fn load(
        &self,
        session: Arc<TraceSession>,
        replayers: ReplayerSet,
    ) -> Result<(), EngineError> {
        self.ensure_not_running()?;
        debug!(
            "Loading {} packets with {} replayer(s)",
            session.len(),
            replayers.len()
        );
        *lock_state(&self.state) = Some(ReplayState::new(session, replayers));
        self.flags.set_position(None);
        self.flags.disarm_breakpoint();
        self.flags.set_state(EngineState::Idle);
        Ok(())
    }

    /// Drop the trace and unload its replayers
    pub fn unload(&self) -> Result<(), EngineError> {
        self.ensure_not_running()?;
        let previous = lock_state(&self.state).take();
        if previous.is_some() {
            debug!("Unloaded trace");
        }
        self.flags.set_state(EngineState::Idle);
        Ok(())
    }

    fn send(&self, command: Command) -> Result<(), EngineError> {
        let sent = self
            .commands
            .as_ref()
            .is_some_and(|tx| tx.send(command).is_ok());
        if !sent {
            self.flags.set_state(EngineState::Idle);
            return Err(EngineError::WorkerDisconnected);
        }
        Ok(())
    }

    /// Start a run from the first packet, optionally pausing after it
    fn begin(&self, pause_after_first: bool) -> Result<(), EngineError> {
        let state = self.state();
        if matches!(state, EngineState::Playing | EngineState::Stopping) {
            warn!("Ignoring start while {}", state);
            return Ok(());
        }
        if !self.is_loaded() {
            return Err(EngineError::NoTraceLoaded);
        }

        self.flags.clear_requests();
        if pause_after_first {
            self.flags.request_pause();
        }
        if !self.flags.transition(state, EngineState::Playing) {
            warn!("Engine state changed during start; ignoring");
            return Ok(());
        }
        self.send(Command::Start)
    }

    /// Play from the first packet
    ///
    /// Restarts a paused run. Ignored while already playing.
    pub fn start(&self) -> Result<(), EngineError> {
        self.begin(false)
    }

    /// Pause after the packet currently executing
    pub fn pause(&self) {
        if self.state() == EngineState::Playing {
            self.flags.request_pause();
        }
    }

    /// Continue a paused run from the next packet
    pub fn resume(&self) -> Result<(), EngineError> {
        if !self.flags.transition(EngineState::Paused, EngineState::Playing) {
            debug!("Resume ignored while {}", self.state());
            return Ok(());
        }
        self.send(Command::Continue)
    }

    /// Execute exactly one packet, then pause
    ///
    /// From idle or finished this starts a new run and pauses after its first packet.
    pub fn step(&self) -> Result<(), EngineError> {
        match self.state() {
            EngineState::Paused => {
                self.flags.request_pause();
                self.resume()
            }
            EngineState::Idle | EngineState::Finished => self.begin(true),
            EngineState::Playing => {
                self.flags.request_pause();
                Ok(())
            }
            EngineState::Stopping => Ok(()),
        }
    }

    /// Stop the current run
    ///
    /// A paused run stops immediately and `Stopped` is emitted before this
    /// returns. A playing run stops after its in-flight packet.
    pub fn stop(&self) {
        match self.state() {
            EngineState::Playing => {
                self.flags.request_stop();
                if !self.flags.transition(EngineState::Playing, EngineState::Stopping) {
                    // Paused or finished in the meantime
                    self.flags.take_stop();
                    self.stop();
                }
            }
            EngineState::Paused => {
                if !self.flags.transition(EngineState::Paused, EngineState::Idle) {
                    return;
                }
                let last = {
                    let mut guard = lock_state(&self.state);
                    guard.as_mut().and_then(|state| {
                        let last = state.last_global;
                        state.rewind();
                        last
                    })
                };
                self.flags.clear_requests();
                self.flags.set_position(None);
                self.flags.disarm_breakpoint();
                debug!("Replay stopped while paused");
                let _ = self.events.send(ReplayEvent::Stopped { global_index: last });
            }
            EngineState::Idle | EngineState::Stopping | EngineState::Finished => {}
        }
    }

    /// Stop the running walk and replay again from the first packet up to `global_index`
    ///
    /// The worker ends the current run (emitting `Stopped`, or `Finished` if it
    /// reached the end first) before starting the new one.
    fn restart_to(&self, global_index: u64) -> Result<(), EngineError> {
        self.flags.request_stop();
        if !self.flags.transition(EngineState::Playing, EngineState::Stopping) {
            // Paused or finished in the meantime
            self.flags.take_stop();
            return self.play_to(global_index);
        }
        debug!("Restarting replay to reach packet {}", global_index);
        self.send(Command::Restart {
            breakpoint: global_index,
        })
    }

    /// Run until the packet with `global_index` has executed, then pause
    ///
    /// A target at or behind the current position restarts from the first
    /// packet, even while playing; a target ahead of it continues the current
    /// run.
    pub fn play_to(&self, global_index: u64) -> Result<(), EngineError> {
        let state = self.state();
        let behind = self.position().is_some_and(|position| global_index <= position);
        self.flags.arm_breakpoint(global_index);

        match state {
            EngineState::Idle | EngineState::Finished => self.begin(false),
            EngineState::Paused if behind => self.begin(false),
            EngineState::Paused => self.resume(),
            EngineState::Playing if behind => self.restart_to(global_index),
            EngineState::Playing => Ok(()),
            EngineState::Stopping => {
                self.flags.disarm_breakpoint();
                Ok(())
            }
        }
    }
}

impl Drop for ReplayEngine {
    fn drop(&mut self) {
        self.flags.request_shutdown();
        self.flags.request_stop();

        // Disconnect first so the worker's recv() fails once the walk ends
        drop(self.commands.take());

        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}
