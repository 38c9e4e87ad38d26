//! Per-stream packet-size assignment and traffic counters.
//!
//! A [`StreamTable`] belongs to one side of a transfer.  The sender and the
//! receiver each own their own table and fill it only from traffic they
//! process themselves, so the two sides may assign different packet sizes to
//! the same stream id.
//!
//! Entries are created lazily the first time an id is referenced and are
//! never removed; the statistics reporter reads them once at session end.
//!
//! The table is shared between concurrent chunk-sending tasks, so all state
//! sits behind a single [`Mutex`].  No lock is ever held across an `.await`.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::Rng;

/// Default lower bound of the random packet-size range (inclusive).
pub const MIN_PACKET_SIZE: usize = 1000;

/// Default upper bound of the random packet-size range (inclusive).
pub const MAX_PACKET_SIZE: usize = 2000;

/// How a fresh stream gets its maximum packet size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizePolicy {
    /// Uniformly random in `min..=max`.
    Random { min: usize, max: usize },
    /// Every stream gets the same size.
    Fixed(usize),
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self::Random {
            min: MIN_PACKET_SIZE,
            max: MAX_PACKET_SIZE,
        }
    }
}

impl SizePolicy {
    fn pick(&self) -> usize {
        match *self {
            SizePolicy::Fixed(n) => n.max(1),
            SizePolicy::Random { min, max } => {
                let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
                rand::rng().random_range(lo.max(1)..=hi.max(1))
            }
        }
    }
}

/// Counters for one stream, copied out of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCounters {
    pub stream_id: u32,
    /// Maximum chunk size assigned to this stream.
    pub packet_size: usize,
    /// Cumulative payload bytes sent or received.
    pub bytes: u64,
    /// Cumulative packets sent or received.
    pub packets: u64,
    /// Time of the first recorded packet.
    pub first_activity: Option<Instant>,
    /// Time of the most recent recorded packet.
    pub last_activity: Option<Instant>,
}

impl StreamCounters {
    fn new(stream_id: u32, packet_size: usize) -> Self {
        Self {
            stream_id,
            packet_size,
            bytes: 0,
            packets: 0,
            first_activity: None,
            last_activity: None,
        }
    }

    /// Time between first and last activity, or `None` if either is missing.
    pub fn active_window(&self) -> Option<Duration> {
        match (self.first_activity, self.last_activity) {
            (Some(first), Some(last)) => Some(last.saturating_duration_since(first)),
            _ => None,
        }
    }

    fn record(&mut self, byte_count: usize, at: Instant) {
        self.bytes += byte_count as u64;
        self.packets += 1;
        if self.first_activity.is_none() {
            self.first_activity = Some(at);
        }
        self.last_activity = Some(at);
    }
}

/// Registry of every stream one side of the transfer has touched.
#[derive(Debug, Default)]
pub struct StreamTable {
    policy: SizePolicy,
    streams: Mutex<BTreeMap<u32, StreamCounters>>,
}

impl StreamTable {
    pub fn new(policy: SizePolicy) -> Self {
        Self {
            policy,
            streams: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn policy(&self) -> SizePolicy {
        self.policy
    }

    /// Return the packet size assigned to `stream_id`, assigning one now if
    /// the id has never been seen.
    pub fn size_for(&self, stream_id: u32) -> usize {
        let mut streams = self.lock();
        streams
            .entry(stream_id)
            .or_insert_with(|| {
                let size = self.policy.pick();
                log::debug!("[streams] stream {stream_id} assigned packet size {size}");
                StreamCounters::new(stream_id, size)
            })
            .packet_size
    }

    /// Count one transmitted packet of `byte_count` payload bytes.
    pub fn record_send(&self, stream_id: u32, byte_count: usize) {
        self.record(stream_id, byte_count, Instant::now());
    }

    /// Count one received packet of `byte_count` payload bytes.
    pub fn record_receive(&self, stream_id: u32, byte_count: usize) {
        self.record(stream_id, byte_count, Instant::now());
    }

    /// Counters for a single stream, if it exists.
    pub fn get(&self, stream_id: u32) -> Option<StreamCounters> {
        self.lock().get(&stream_id).cloned()
    }

    /// Copy of every stream's counters, ordered by stream id.
    pub fn snapshot(&self) -> Vec<StreamCounters> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn record(&self, stream_id: u32, byte_count: usize, at: Instant) {
        let mut streams = self.lock();
        let policy = self.policy;
        streams
            .entry(stream_id)
            .or_insert_with(|| StreamCounters::new(stream_id, policy.pick()))
            .record(byte_count, at);
    }

    // A panic while holding the lock cannot leave a counter half-updated,
    // so a poisoned table is still usable.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<u32, StreamCounters>> {
        self.streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
