//! Dump command - list packets in capture order
//!
//! Without `--decode` only container-level packets are described. With it,
//! the controller for the trace's API is loaded and every packet must
//! decode; a missing controller or an undecodable packet is an error.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gfxreplay_core::interpret::{LogMessage, PacketClass, interpret_session};
use gfxreplay_core::plugin::Controller;
use gfxreplay_core::trace::{PacketRecord, TraceSession, open_and_index};
use serde::Serialize;

/// Arguments for the dump command
#[derive(Args)]
pub struct DumpArgs {
    /// Trace file to dump
    pub trace: PathBuf,

    /// Skip packets before this array index
    #[arg(long, default_value_t = 0)]
    pub from: usize,

    /// Print at most this many packets
    #[arg(long)]
    pub limit: Option<usize>,

    /// Decode API packets with the trace's controller plugin
    #[arg(long)]
    pub decode: bool,

    /// One JSON object per line instead of a table
    #[arg(long)]
    pub json: bool,

    /// Config file (defaults to the platform config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// One line of dump output
#[derive(Debug, Serialize)]
pub struct PacketRow {
    pub index: usize,
    pub global_index: u64,
    pub tracer_id: u8,
    pub packet_id: u16,
    pub kind: &'static str,
    pub thread_id: u32,
    pub size: u64,
    pub call_duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PacketRow {
    fn new(index: usize, record: &PacketRecord, description: Option<String>) -> Self {
        Self {
            index,
            global_index: record.global_index,
            tracer_id: record.tracer_id.0,
            packet_id: record.packet_id,
            kind: record.kind().name(),
            thread_id: record.thread_id,
            size: record.size(),
            call_duration: record.call_duration(),
            description,
        }
    }
}

/// Describe a packet without any plugin
fn describe_builtin(record: &PacketRecord) -> Option<String> {
    match PacketClass::of(record.packet_id) {
        PacketClass::Message => Some(match LogMessage::decode(record.body()) {
            Some(message) => message.to_string(),
            None => "<malformed message>".to_string(),
        }),
        PacketClass::Marker(kind) => Some(kind.name().to_string()),
        PacketClass::Api => None,
    }
}

/// Build the rows for a window of the session, describing only container packets
pub fn rows(session: &TraceSession, from: usize, limit: Option<usize>) -> Vec<PacketRow> {
    session
        .packets()
        .iter()
        .enumerate()
        .skip(from)
        .take(limit.unwrap_or(usize::MAX))
        .map(|(index, record)| PacketRow::new(index, record, describe_builtin(record)))
        .collect()
}

/// Build the rows for a window of the session with every packet decoded
///
/// The whole session is interpreted first; one packet nothing can decode
/// fails the dump.
pub fn decoded_rows(
    session: &TraceSession,
    controller: Option<&dyn Controller>,
    from: usize,
    limit: Option<usize>,
) -> Result<Vec<PacketRow>> {
    let packets = interpret_session(session, controller).context("Failed to decode trace")?;

    Ok(session
        .packets()
        .iter()
        .zip(&packets)
        .enumerate()
        .skip(from)
        .take(limit.unwrap_or(usize::MAX))
        .map(|(index, (record, packet))| {
            PacketRow::new(index, record, Some(packet.describe(controller)))
        })
        .collect())
}

/// Execute the dump command
pub fn execute(args: DumpArgs) -> Result<()> {
    let session = open_and_index(&args.trace)
        .with_context(|| format!("Failed to open trace {}", args.trace.display()))?;

    let rows = if args.decode {
        let config = crate::config::load(args.config.as_deref())?;
        let loader = config.plugin_loader(crate::module_provider());
        let controller = loader
            .load_controller_for(session.header())
            .context("Failed to load controller")?
            .context("No controller module mapped for this trace's tracers")?;
        decoded_rows(&session, Some(&*controller), args.from, args.limit)?
    } else {
        rows(&session, args.from, args.limit)
    };

    for row in &rows {
        if args.json {
            println!("{}", serde_json::to_string(row)?);
        } else {
            println!(
                "{:>8} {:>10} t{:<3} {:>6} {:>5} {:<16} {:>8}  {}",
                row.index,
                row.global_index,
                row.tracer_id,
                row.thread_id,
                row.packet_id,
                row.kind,
                row.size,
                row.description.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_trace;

    #[test]
    fn test_rows_without_controller() {
        let (_dir, path) = write_trace();
        let session = open_and_index(&path).unwrap();

        let rows = rows(&session, 0, None);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].description.as_deref(), Some("[info] capture started"));
        assert_eq!(rows[1].description.as_deref(), Some("GroupBegin"));
        assert_eq!(rows[2].kind, "Api");
        assert_eq!(rows[2].description, None);
        assert_eq!(rows[2].call_duration, 30);
    }

    #[test]
    fn test_rows_window() {
        let (_dir, path) = write_trace();
        let session = open_and_index(&path).unwrap();

        let rows = rows(&session, 2, Some(2));
        let indices: Vec<usize> = rows.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![2, 3]);
        assert_eq!(rows[0].packet_id, 100);
    }

    #[test]
    fn test_row_json_skips_missing_description() {
        let (_dir, path) = write_trace();
        let session = open_and_index(&path).unwrap();

        let rows = rows(&session, 2, Some(1));
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["packet_id"], 100);
        assert_eq!(json["kind"], "Api");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_decode_without_controller_fails() {
        let (_dir, path) = write_trace();
        let session = open_and_index(&path).unwrap();

        // The first API packet sits at global index 2
        let err = decoded_rows(&session, None, 0, None).unwrap_err();
        assert!(err.to_string().contains("Failed to decode trace"));
        assert!(err.root_cause().to_string().starts_with("packet 2 "));
    }

    #[test]
    fn test_decode_with_unmapped_tracer_is_fatal() {
        let (dir, path) = write_trace();
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "[plugins.tracer_modules]\n").unwrap();

        let args = DumpArgs {
            trace: path,
            from: 0,
            limit: None,
            decode: true,
            json: false,
            config: Some(config),
        };
        let err = execute(args).unwrap_err();
        assert!(err.to_string().contains("No controller module mapped"));
    }

    #[test]
    fn test_decode_with_unlinked_module_is_fatal() {
        let (dir, path) = write_trace();
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "[plugins.tracer_modules]\n\"2\" = \"vulkan_replay\"\n").unwrap();

        let args = DumpArgs {
            trace: path,
            from: 0,
            limit: None,
            decode: true,
            json: false,
            config: Some(config),
        };
        let err = execute(args).unwrap_err();
        assert!(err.to_string().contains("Failed to load controller"));
    }
}
