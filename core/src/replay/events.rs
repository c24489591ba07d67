//! Replay engine states and events

use std::fmt;

/// Lifecycle of the replay engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EngineState {
    /// Nothing running; a trace may or may not be loaded
    Idle = 0,
    Playing = 1,
    Paused = 2,
    /// Stop requested, waiting for the in-flight packet to finish
    Stopping = 3,
    /// Last run reached the end of the trace
    Finished = 4,
}

impl EngineState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Playing,
            2 => Self::Paused,
            3 => Self::Stopping,
            4 => Self::Finished,
            _ => Self::Idle,
        }
    }

    /// Whether a run is in progress (including a paused one)
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused | Self::Stopping)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Notifications emitted by the replay engine
///
/// `global_index` values name the last packet that executed, `None` when the
/// run ended before executing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayEvent {
    /// A run started from the first packet
    Started,
    /// About to execute the packet at this array index
    Progress { index: usize },
    /// Execution halted after this packet
    Paused { global_index: u64 },
    /// A paused run resumed
    Continued,
    Stopped { global_index: Option<u64> },
    Finished { global_index: Option<u64> },
}

impl ReplayEvent {
    /// Whether this event ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped { .. } | Self::Finished { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip_through_u8() {
        for state in [
            EngineState::Idle,
            EngineState::Playing,
            EngineState::Paused,
            EngineState::Stopping,
            EngineState::Finished,
        ] {
            assert_eq!(EngineState::from_u8(state as u8), state);
        }
        assert!(EngineState::Paused.is_active());
        assert!(!EngineState::Finished.is_active());
    }
}
