//! Replay engine
//!
//! Walks an indexed trace packet by packet on a dedicated worker thread,
//! routing API packets to the replayer loaded for their tracer.
//!
//! ```text
//!            start / step / play_to
//!   Idle ───────────────────────────────▶ Playing ──── end of trace ───▶ Finished
//!    ▲                                     │  ▲  │
//!    │ stop (immediate)        pause/step/ │  │  │ stop
//!    │                         breakpoint  ▼  │  ▼
//!    └──────────────────────────────────── Paused   Stopping ──▶ Idle
//!                                      resume/step
//! ```

mod control;
mod engine;
mod error;
mod events;
mod sink;
mod worker;


pub use engine::ReplayEngine;
pub use error::EngineError;
pub use events::{EngineState, ReplayEvent};
pub use sink::{LogSink, TracingLogSink};
pub use worker::{PacketOutcome, ReplaySummary};
