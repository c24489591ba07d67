//! Replay command - headless replay through the API replayers
//!
//! Loads one replayer per tracer that needs one, then drives the replay
//! engine to the end of the trace or to a `--play-to` breakpoint.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use gfxreplay_core::plugin::{PluginError, ReplayerSet, SurfaceTarget};
use gfxreplay_core::replay::{
    EngineState, LogSink, ReplayEngine, ReplayEvent, ReplaySummary, TracingLogSink,
};
use gfxreplay_core::trace::{TraceSession, open_and_index};
use tracing::{debug, info, warn};

const FALLBACK_SURFACE: SurfaceTarget = SurfaceTarget::Offscreen {
    width: 1280,
    height: 720,
};

/// Arguments for the replay command
#[derive(Args)]
pub struct ReplayArgs {
    /// Trace file to replay
    pub trace: PathBuf,

    /// Pause after the packet with this global index, then stop
    #[arg(long, value_name = "GLOBAL_INDEX")]
    pub play_to: Option<u64>,

    /// Render offscreen at this size, e.g. 1920x1080
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub offscreen: Option<(u32, u32)>,

    /// Enable API validation layers
    #[arg(long)]
    pub validation: bool,

    /// Walk the trace without loading replayers; API packets are skipped
    #[arg(long)]
    pub dry_run: bool,

    /// Config file (defaults to the platform config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Parse `WIDTHxHEIGHT`
pub fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (width, height) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let parse = |v: &str| v.trim().parse::<u32>().map_err(|e| format!("invalid size '{s}': {e}"));
    let size = (parse(width)?, parse(height)?);
    if size.0 == 0 || size.1 == 0 {
        return Err(format!("size must be non-zero, got '{s}'"));
    }
    Ok(size)
}

/// Execute the replay command
pub fn execute(args: ReplayArgs) -> Result<()> {
    let session = open_and_index(&args.trace)
        .with_context(|| format!("Failed to open trace {}", args.trace.display()))?;
    let session = Arc::new(session);

    let config = crate::config::load(args.config.as_deref())?;
    let mut options = config.replay_options();
    options.validation |= args.validation;
    let surface = match args.offscreen {
        Some((width, height)) => SurfaceTarget::Offscreen { width, height },
        None => config.surface_target(None).unwrap_or(FALLBACK_SURFACE),
    };

    let sink: Arc<dyn LogSink> = Arc::new(TracingLogSink);
    let loader = config.plugin_loader(crate::module_provider());
    let replayers = if args.dry_run {
        ReplayerSet::new()
    } else {
        match loader.load_replayers(session.header(), surface, &options, Arc::clone(&sink)) {
            Ok(replayers) => replayers,
            Err(PluginError::ModuleNotFound(path)) => {
                warn!(
                    "Replayer module {} is not linked into this build; API packets will be skipped",
                    path.display()
                );
                ReplayerSet::new()
            }
            Err(e) => return Err(e).context("Failed to load replayers"),
        }
    };

    println!("=== Replay ===");
    println!("  Trace: {} ({} packets)", args.trace.display(), session.len());
    println!("  Surface: {:?}", surface);
    println!("  Replayers: {}", replayers.len());

    let outcome = run(session, replayers, args.play_to, sink)?;

    print_summary(&outcome);
    let failed = outcome.summary.hard_failures + outcome.summary.call_failures;
    if failed > 0 {
        anyhow::bail!("Replay had {} failed call(s)", failed);
    }
    Ok(())
}

/// How a headless run ended
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: ReplaySummary,
    /// The walk reached the end of the trace
    pub finished: bool,
    /// Breakpoint the walk paused on
    pub reached: Option<u64>,
}

/// Replay `session` to the end, or to `play_to` and stop there
pub fn run(
    session: Arc<TraceSession>,
    replayers: ReplayerSet,
    play_to: Option<u64>,
    sink: Arc<dyn LogSink>,
) -> Result<RunOutcome> {
    let (engine, events) = ReplayEngine::new(sink);
    engine.load(session, replayers)?;
    match play_to {
        Some(target) => engine.play_to(target)?,
        None => engine.start()?,
    }

    let mut reached = None;
    for event in events.iter() {
        match event {
            ReplayEvent::Progress { index } => debug!("Executing packet {}", index),
            ReplayEvent::Paused { global_index } => {
                info!("Paused after packet {}", global_index);
                reached = Some(global_index);
                // Headless: a breakpoint ends the session
                engine.stop();
            }
            ReplayEvent::Stopped { global_index } | ReplayEvent::Finished { global_index } => {
                debug!("Run ended at {:?}", global_index);
                break;
            }
            ReplayEvent::Started | ReplayEvent::Continued => {}
        }
    }

    Ok(RunOutcome {
        summary: engine.summary().unwrap_or_default(),
        finished: engine.state() == EngineState::Finished,
        reached,
    })
}

fn print_summary(outcome: &RunOutcome) {
    let summary = &outcome.summary;
    println!();
    println!("=== Summary ===");
    match (outcome.finished, outcome.reached) {
        (true, _) => println!("  Reached end of trace"),
        (false, Some(global_index)) => println!("  Stopped at packet {global_index}"),
        (false, None) => println!("  Stopped before the target packet"),
    }
    println!("  Executed:        {}", summary.executed);
    println!("  Skipped:         {}", summary.skipped);
    println!("  Messages:        {}", summary.messages);
    println!("  Markers:         {}", summary.markers);
    println!("  Failures:        {}", summary.hard_failures);
    println!("  Divergences:     {}", summary.divergences);
    println!("  Suppressed:      {}", summary.suppressed);
    println!("  Unknown status:  {}", summary.unknown);
    println!("  Crashed calls:   {}", summary.call_failures);
}
