//! End-of-session throughput statistics.
//!
//! [`generate_report`] turns a [`StreamTable`] into a [`StatisticsSnapshot`].
//! The snapshot is a plain value: the driver decides whether to print it,
//! write it as text (its [`Display`](std::fmt::Display) impl) or serialise
//! it as JSON.
//!
//! Rates are `value / duration` when the duration is positive and `0`
//! otherwise.  The aggregate duration is the longest per-stream window among
//! streams that have both timestamps, so a session where no stream saw any
//! traffic reports zero rates instead of failing.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::streams::{StreamCounters, StreamTable};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStatistics {
    pub stream_id: u32,
    pub packet_size: usize,
    pub bytes: u64,
    pub packets: u64,
    /// Seconds between first and last activity.
    pub duration_secs: f64,
    /// Bytes per second.
    pub byte_rate: f64,
    /// Packets per second.
    pub packet_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStatistics {
    /// Number of streams in the snapshot.
    pub streams: usize,
    pub bytes: u64,
    pub packets: u64,
    /// Longest per-stream duration, in seconds.
    pub duration_secs: f64,
    pub byte_rate: f64,
    pub packet_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub streams: Vec<StreamStatistics>,
    pub aggregate: AggregateStatistics,
}

/// Snapshot the counters of `table`.
pub fn generate_report(table: &StreamTable) -> StatisticsSnapshot {
    StatisticsSnapshot::from_counters(&table.snapshot())
}

impl StatisticsSnapshot {
    pub fn from_counters(counters: &[StreamCounters]) -> Self {
        let streams: Vec<StreamStatistics> = counters
            .iter()
            .map(|c| {
                let duration_secs = c.active_window().map_or(0.0, |d| d.as_secs_f64());
                StreamStatistics {
                    stream_id: c.stream_id,
                    packet_size: c.packet_size,
                    bytes: c.bytes,
                    packets: c.packets,
                    duration_secs,
                    byte_rate: rate(c.bytes, duration_secs),
                    packet_rate: rate(c.packets, duration_secs),
                }
            })
            .collect();

        let bytes = counters.iter().map(|c| c.bytes).sum();
        let packets = counters.iter().map(|c| c.packets).sum();
        let duration_secs = match counters.iter().filter_map(StreamCounters::active_window).max() {
            Some(window) => window.as_secs_f64(),
            None => {
                log::debug!("[stats] no stream has a complete activity window");
                0.0
            }
        };

        Self {
            aggregate: AggregateStatistics {
                streams: streams.len(),
                bytes,
                packets,
                duration_secs,
                byte_rate: rate(bytes, duration_secs),
                packet_rate: rate(packets, duration_secs),
            },
            streams,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the rendered text report to `path`, replacing any existing file.
    pub fn write_text(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.to_string())
    }
}

fn rate(value: u64, duration_secs: f64) -> f64 {
    if duration_secs > 0.0 {
        value as f64 / duration_secs
    } else {
        0.0
    }
}

impl fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.streams {
            writeln!(f, "Stream {}:", s.stream_id)?;
            writeln!(f, "\tTotal bytes: {}", s.bytes)?;
            writeln!(f, "\tTotal packets: {}", s.packets)?;
            writeln!(f, "\tData rate: {:.2} bytes/sec", s.byte_rate)?;
            writeln!(f, "\tPacket rate: {:.2} packets/sec", s.packet_rate)?;
        }
        let a = &self.aggregate;
        writeln!(f, "Overall statistics:")?;
        writeln!(f, "\tTotal bytes: {}", a.bytes)?;
        writeln!(f, "\tTotal packets: {}", a.packets)?;
        writeln!(f, "\tData rate: {:.2} bytes/sec", a.byte_rate)?;
        writeln!(f, "\tPacket rate: {:.2} packets/sec", a.packet_rate)
    }
}
