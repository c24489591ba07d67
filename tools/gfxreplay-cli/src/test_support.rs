//! Trace fixtures for command tests

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use gfxreplay_core::trace::{
    GpuInfo, LogLevel, PacketBuilder, PacketKind, TraceHeader, TraceWriter, TracerDescriptor,
    TracerFlags, TracerId,
};
use tempfile::TempDir;

/// Vulkan-only header
pub fn header(needs_replayer: bool) -> TraceHeader {
    let flags = if needs_replayer {
        TracerFlags::NEEDS_REPLAYER
    } else {
        TracerFlags::empty()
    };
    TraceHeader::new(
        vec![TracerDescriptor {
            id: TracerId::VULKAN,
            flags,
        }],
        vec![GpuInfo {
            gpu_id: 0x10de_2684,
            driver_version: 0x0221_4000,
        }],
    )
}

/// Message, group begin, three Vulkan calls, group end
pub fn write_trace_with(header: &TraceHeader) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.gxtr");
    let file = BufWriter::new(File::create(&path).unwrap());

    let mut writer = TraceWriter::new(file, header).unwrap();
    writer.write_message(LogLevel::Info, "capture started").unwrap();
    writer.write_marker(PacketKind::GroupBegin).unwrap();
    for packet_id in [100, 101, 102] {
        writer
            .write_packet(
                &PacketBuilder::api(TracerId::VULKAN, packet_id, vec![0; 16])
                    .with_timing(10, 20, 50, 60),
            )
            .unwrap();
    }
    writer.write_marker(PacketKind::GroupEnd).unwrap();
    writer.finish(true).unwrap();

    (dir, path)
}

pub fn write_trace() -> (TempDir, PathBuf) {
    write_trace_with(&header(true))
}
