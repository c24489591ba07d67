//! Info command - summarize a trace without loading any plugin

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gfxreplay_core::trace::{PacketKind, TraceSession, TracerId, open_and_index};

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// Trace file to inspect
    pub trace: PathBuf,
}

/// Packet counts by kind
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Histogram {
    /// Built-in kinds by name
    pub builtin: BTreeMap<&'static str, usize>,
    /// API packets by tracer
    pub api: BTreeMap<TracerId, usize>,
}

impl Histogram {
    pub fn of(session: &TraceSession) -> Self {
        let mut histogram = Self::default();
        for record in session.packets() {
            match record.kind() {
                PacketKind::Api(_) => *histogram.api.entry(record.tracer_id).or_default() += 1,
                kind => *histogram.builtin.entry(kind.name()).or_default() += 1,
            }
        }
        histogram
    }
}

/// Execute the info command
pub fn execute(args: InfoArgs) -> Result<()> {
    let session = open_and_index(&args.trace)
        .with_context(|| format!("Failed to open trace {}", args.trace.display()))?;
    let header = session.header();

    println!("=== Trace ===");
    println!("  File: {}", args.trace.display());
    println!("  Format version: {}", header.format_version);
    println!("  UUID: {}", hex(&header.uuid));
    println!("  Pointer size: {} bytes", header.pointer_size);
    println!("  Start time: {}", header.trace_start_time);

    println!("  Tracers:");
    for tracer in &header.tracers {
        let replayer = if tracer.needs_replayer() { " (replayed)" } else { "" };
        println!("    {} flags={:?}{}", tracer.id, tracer.flags, replayer);
    }
    println!("  GPUs:");
    for gpu in &header.gpus {
        println!("    id={:#x} driver={:#x}", gpu.gpu_id, gpu.driver_version);
    }

    let histogram = Histogram::of(&session);
    let api_time: u64 = session
        .packets()
        .iter()
        .filter(|p| p.kind().is_api())
        .map(|p| p.call_duration())
        .sum();

    println!();
    println!("=== Packets ({}) ===", session.len());
    for (name, count) in &histogram.builtin {
        println!("  {name:<18} {count}");
    }
    for (tracer, count) in &histogram.api {
        println!("  {:<18} {count}", format!("API tracer {tracer}"));
    }
    println!("  Time in API calls: {api_time}");

    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
