//! Flags shared between the control side and the replay worker
//!
//! All requests that must be observed mid-run travel through atomics and are
//! polled by the worker once per packet.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use super::events::EngineState;

const NONE: u64 = u64::MAX;

#[derive(Debug)]
pub(crate) struct ControlFlags {
    state: AtomicU8,
    pause: AtomicBool,
    stop: AtomicBool,
    /// Engine dropped; queued commands are discarded
    shutdown: AtomicBool,
    /// Global index to pause after, `NONE` when disarmed
    breakpoint: AtomicU64,
    /// Global index of the last executed packet, `NONE` before the first
    position: AtomicU64,
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(EngineState::Idle as u8),
            pause: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            breakpoint: AtomicU64::new(NONE),
            position: AtomicU64::new(NONE),
        }
    }
}

fn to_option(value: u64) -> Option<u64> {
    (value != NONE).then_some(value)
}

impl ControlFlags {
    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; false if the state was something else
    pub fn transition(&self, from: EngineState, to: EngineState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::Release);
    }

    /// Consume a pending pause request
    pub fn take_pause(&self) -> bool {
        self.pause.swap(false, Ordering::AcqRel)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Consume a pending stop request
    pub fn take_stop(&self) -> bool {
        self.stop.swap(false, Ordering::AcqRel)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Clear pause and stop requests before a new run
    pub fn clear_requests(&self) {
        self.pause.store(false, Ordering::Release);
        self.stop.store(false, Ordering::Release);
    }

    pub fn arm_breakpoint(&self, global_index: u64) {
        self.breakpoint.store(global_index, Ordering::Release);
    }

    pub fn disarm_breakpoint(&self) {
        self.breakpoint.store(NONE, Ordering::Release);
    }

    pub fn breakpoint(&self) -> Option<u64> {
        to_option(self.breakpoint.load(Ordering::Acquire))
    }

    /// Disarm and report true if the breakpoint is set on `global_index`
    pub fn hit_breakpoint(&self, global_index: u64) -> bool {
        global_index != NONE
            && self
                .breakpoint
                .compare_exchange(global_index, NONE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    pub fn position(&self) -> Option<u64> {
        to_option(self.position.load(Ordering::Acquire))
    }

    pub fn set_position(&self, global_index: Option<u64>) {
        self.position
            .store(global_index.unwrap_or(NONE), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoint_disarms_on_hit() {
        let flags = ControlFlags::default();
        assert_eq!(flags.breakpoint(), None);

        flags.arm_breakpoint(12);
        assert!(!flags.hit_breakpoint(11));
        assert!(flags.hit_breakpoint(12));
        assert!(!flags.hit_breakpoint(12));
        assert_eq!(flags.breakpoint(), None);
    }

    #[test]
    fn test_requests_are_consumed_once() {
        let flags = ControlFlags::default();
        flags.request_pause();
        flags.request_stop();
        assert!(flags.take_pause());
        assert!(!flags.take_pause());
        assert!(flags.take_stop());
        assert!(!flags.take_stop());
    }

    #[test]
    fn test_transition_requires_expected_state() {
        let flags = ControlFlags::default();
        assert!(!flags.transition(EngineState::Paused, EngineState::Idle));
        assert!(flags.transition(EngineState::Idle, EngineState::Playing));
        assert_eq!(flags.state(), EngineState::Playing);
    }
}
