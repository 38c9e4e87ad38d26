//! Outbound side: per-stream packetisation and concurrent transmission.
//!
//! [`Sender::send`] cuts one stream's payload into chunks of at most the
//! stream's packet size, encodes each chunk as a [`crate::packet::Frame`] and
//! transmits every chunk as an independent tokio task.
//!
//! # Concurrency contract
//! - At most `max_in_flight` chunk tasks of a stream run at once.
//! - Chunks never exceed [`MAX_DATAGRAM_PAYLOAD`], whatever size the
//!   stream was assigned.
//! - `send` joins every chunk task before returning, so streams are sent
//!   strictly one after another.
//! - Chunks of one stream are not ordered on the wire; the frame offset is
//!   the only ordering signal carried.
//! - Every successful transmission is counted in the sender's
//!   [`StreamTable`].  A failed transmission is logged and skipped; there is
//!   no retransmission.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::{JoinError, JoinSet};

use crate::input::{self, InputError};
use crate::packet::{
    encode_data, Frame, CLOSE_SENTINEL, CONTROL_STREAM_ID, MAX_DATAGRAM_PAYLOAD,
};
use crate::socket::{Socket, SocketError};
use crate::state::SenderState;
use crate::streams::StreamTable;

// ---------------------------------------------------------------------------
// Errors and results
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SendError {
    /// Stream id 0 carries control frames only.
    #[error("stream id {0} is reserved for control frames")]
    ReservedStreamId(u32),
    /// The close frame was already sent.
    #[error("sender is closed")]
    Closed,
    /// Frame offsets are 32-bit; larger payloads cannot be addressed.
    #[error("payload of {0} bytes does not fit 32-bit frame offsets")]
    PayloadTooLarge(usize),
    /// The input file for the stream could not be read.  Nothing was sent.
    #[error("input file {path} could not be read: {source}")]
    MissingInputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<InputError> for SendError {
    fn from(e: InputError) -> Self {
        match e {
            InputError::Missing { path, source } => Self::MissingInputFile { path, source },
        }
    }
}

/// Outcome of sending one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendSummary {
    pub stream_id: u32,
    /// Chunk size actually used: the stream's packet size, capped at
    /// [`MAX_DATAGRAM_PAYLOAD`].
    pub packet_size: usize,
    /// Chunks dispatched (`ceil(len / packet_size)`).
    pub chunks: usize,
    /// Chunks the socket accepted.
    pub sent: usize,
    /// Chunks whose transmission failed.
    pub failed: usize,
    /// Payload bytes in the accepted chunks.
    pub bytes: u64,
    /// Most chunk tasks held in the join set at once.
    pub peak_in_flight: usize,
}

impl SendSummary {
    fn tally(&mut self, joined: Result<Result<usize, SocketError>, JoinError>) {
        match joined {
            Ok(Ok(len)) => {
                self.sent += 1;
                self.bytes += len as u64;
            }
            Ok(Err(_)) => self.failed += 1,
            Err(e) => {
                log::error!("[send] chunk task for stream {} aborted: {e}", self.stream_id);
                self.failed += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Send half of a transfer, bound to one destination.
#[derive(Debug)]
pub struct Sender {
    socket: Arc<Socket>,
    dest: SocketAddr,
    streams: Arc<StreamTable>,
    max_in_flight: usize,
    legacy_close: bool,
    state: SenderState,
}

impl Sender {
    /// Wrap an already bound socket.
    pub fn new(
        socket: Socket,
        dest: SocketAddr,
        streams: Arc<StreamTable>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            socket: Arc::new(socket),
            dest,
            streams,
            max_in_flight: max_in_flight.max(1),
            legacy_close: false,
            state: SenderState::Idle,
        }
    }

    /// Bind an ephemeral local port and target `dest`.
    pub async fn bind(
        dest: SocketAddr,
        streams: Arc<StreamTable>,
        max_in_flight: usize,
    ) -> Result<Self, SocketError> {
        let socket = Socket::bind_for(dest).await?;
        Ok(Self::new(socket, dest, streams, max_in_flight))
    }

    /// Close with the headerless `close` literal instead of a tagged frame.
    pub fn with_legacy_close(mut self, legacy: bool) -> Self {
        self.legacy_close = legacy;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn destination(&self) -> SocketAddr {
        self.dest
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// The send-side stream table.
    pub fn streams(&self) -> &Arc<StreamTable> {
        &self.streams
    }

    /// Transmit `data` on `stream_id` and wait for every chunk to finish.
    ///
    /// Chunk `i` starts at frame offset `i * packet_size`; the last chunk may
    /// be shorter.  Empty `data` sends nothing but still assigns the stream
    /// its packet size.
    pub async fn send(&mut self, data: &[u8], stream_id: u32) -> Result<SendSummary, SendError> {
        if self.state == SenderState::CloseSent {
            return Err(SendError::Closed);
        }
        if stream_id == CONTROL_STREAM_ID {
            return Err(SendError::ReservedStreamId(stream_id));
        }
        if data.len() > u32::MAX as usize {
            return Err(SendError::PayloadTooLarge(data.len()));
        }

        let packet_size = self.streams.size_for(stream_id).min(MAX_DATAGRAM_PAYLOAD);
        let mut summary = SendSummary {
            stream_id,
            packet_size,
            ..SendSummary::default()
        };

        let mut tasks = JoinSet::new();
        self.state = SenderState::Sending;

        for (index, chunk) in data.chunks(packet_size).enumerate() {
            while tasks.len() >= self.max_in_flight {
                if let Some(joined) = tasks.join_next().await {
                    summary.tally(joined);
                }
            }

            // Offsets are below `data.len()`, which was checked to fit in u32.
            let frame_offset = (index * packet_size) as u32;
            let bytes = encode_data(stream_id, frame_offset, chunk, packet_size);
            let len = chunk.len();
            let socket = Arc::clone(&self.socket);
            let streams = Arc::clone(&self.streams);
            let dest = self.dest;

            summary.chunks += 1;
            summary.peak_in_flight = summary.peak_in_flight.max(tasks.len() + 1);
            tasks.spawn(async move {
                match socket.send_raw(&bytes, dest).await {
                    Ok(wire_len) => {
                        streams.record_send(stream_id, len);
                        log::debug!(
                            "[send] → {dest} stream={stream_id} offset={frame_offset} size={wire_len}"
                        );
                        Ok(len)
                    }
                    Err(e) => {
                        log::warn!(
                            "[send] stream={stream_id} offset={frame_offset} not sent: {e}"
                        );
                        Err(e)
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            summary.tally(joined);
        }
        self.state = SenderState::Idle;

        log::info!(
            "[send] finished stream {stream_id} to {}: {}/{} chunks, {} bytes",
            self.dest,
            summary.sent,
            summary.chunks,
            summary.bytes
        );
        Ok(summary)
    }

    /// Read `path` and send its contents on `stream_id`.
    ///
    /// The file is read in full before anything is transmitted, so a missing
    /// file produces [`SendError::MissingInputFile`] with no traffic.
    pub async fn send_file(
        &mut self,
        path: impl AsRef<Path>,
        stream_id: u32,
    ) -> Result<SendSummary, SendError> {
        let data = input::read_payload(path)?;
        self.send(&data, stream_id).await
    }

    /// Send the close frame.  Only the first call transmits anything.
    ///
    /// A transport failure here is logged and otherwise ignored; the sender
    /// counts as closed either way.
    pub async fn close(&mut self) {
        if self.state == SenderState::CloseSent {
            log::debug!("[send] close to {} already sent", self.dest);
            return;
        }
        self.state = SenderState::CloseSent;
        let sent = if self.legacy_close {
            self.socket.send_raw(CLOSE_SENTINEL, self.dest).await
        } else {
            self.socket.send_frame(&Frame::Close, self.dest).await
        };
        match sent {
            Ok(_) => log::info!("[send] connection to {} closed", self.dest),
            Err(e) => log::warn!("[send] socket error while closing: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::packet::HEADER_LEN;
    use crate::socket::RecvWait;
    use crate::streams::SizePolicy;

    async fn pair(policy: SizePolicy) -> (Sender, Socket) {
        pair_with(policy, 4).await
    }

    async fn pair_with(policy: SizePolicy, max_in_flight: usize) -> (Sender, Socket) {
        let sink = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let streams = Arc::new(StreamTable::new(policy));
        let sender = Sender::bind(sink.local_addr, streams, max_in_flight)
            .await
            .unwrap();
        (sender, sink)
    }

    /// Receive exactly `n` data frames as `(offset, payload)`, sorted by offset.
    async fn recv_chunks(sink: &Socket, n: usize) -> Vec<(u32, Vec<u8>)> {
        let mut chunks = Vec::with_capacity(n);
        let mut buf = vec![0u8; 65_535];
        for _ in 0..n {
            let (len, _) = sink
                .recv_datagram(&mut buf, RecvWait::Timeout(Duration::from_secs(5)), None)
                .await
                .unwrap();
            match Frame::decode(&buf[..len]).unwrap() {
                Frame::Data {
                    frame_offset,
                    payload,
                    ..
                } => chunks.push((frame_offset, payload)),
                Frame::Close => panic!("unexpected close"),
            }
        }
        chunks.sort_by_key(|(offset, _)| *offset);
        chunks
    }

    /// Check that `data` went out as `ceil(len / size)` chunks at offsets
    /// `0, size, 2 * size, ...` that reassemble into `data`.
    async fn assert_chunked(data: &[u8], size: usize) {
        let (mut sender, sink) = pair(SizePolicy::Fixed(size)).await;
        let summary = sender.send(data, 1).await.unwrap();
        let expected = data.len().div_ceil(size);
        assert_eq!(summary.chunks, expected, "len={} size={size}", data.len());
        assert_eq!(summary.sent, expected);

        let chunks = recv_chunks(&sink, expected).await;
        let offsets: Vec<u32> = chunks.iter().map(|(offset, _)| *offset).collect();
        let want: Vec<u32> = (0..expected).map(|i| (i * size) as u32).collect();
        assert_eq!(offsets, want);
        let joined: Vec<u8> = chunks.into_iter().flat_map(|(_, p)| p).collect();
        assert_eq!(joined, data);
    }

    async fn drain(sink: &Socket) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut buf = vec![0u8; 65_535];
        while let Ok((n, _)) = sink
            .recv_datagram(&mut buf, RecvWait::Timeout(Duration::from_millis(200)), None)
            .await
        {
            frames.push(Frame::decode(&buf[..n]).unwrap());
        }
        frames
    }

    #[tokio::test]
    async fn short_payload_is_one_chunk() {
        let (mut sender, sink) = pair(SizePolicy::Fixed(10)).await;

        let summary = sender.send(b"Test", 1).await.unwrap();
        assert_eq!(summary.chunks, 1);
        assert_eq!(summary.sent, 1);

        let counters = sender.streams().get(1).unwrap();
        assert_eq!(counters.bytes, 4);
        assert_eq!(counters.packets, 1);

        let frames = drain(&sink).await;
        assert_eq!(
            frames,
            vec![Frame::Data {
                stream_id: 1,
                frame_offset: 0,
                payload: b"Test".to_vec()
            }]
        );
    }

    #[tokio::test]
    async fn chunk_count_and_offsets() {
        let (mut sender, sink) = pair(SizePolicy::Fixed(10)).await;
        let data: Vec<u8> = (0..35).collect();

        let summary = sender.send(&data, 2).await.unwrap();
        assert_eq!(summary.chunks, 4);
        assert_eq!(summary.bytes, 35);

        let mut offsets: Vec<u32> = drain(&sink)
            .await
            .into_iter()
            .map(|f| match f {
                Frame::Data { frame_offset, .. } => frame_offset,
                Frame::Close => panic!("unexpected close"),
            })
            .collect();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![0, 10, 20, 30]);
    }

    #[tokio::test]
    async fn chunk_boundaries() {
        assert_chunked(&[5u8; 10], 10).await;
        assert_chunked(&[5u8; 11], 10).await;
        assert_chunked(&[5u8; 1], 10).await;
    }

    #[tokio::test]
    async fn random_lengths_chunk_evenly() {
        let mut rng = StdRng::seed_from_u64(0x5eed_0003);
        for _ in 0..40 {
            let size = rng.random_range(16..=512);
            let len = rng.random_range(1..=8 * size);
            let mut data = vec![0u8; len];
            rng.fill(data.as_mut_slice());
            assert_chunked(&data, size).await;
        }
    }

    #[tokio::test]
    async fn in_flight_cap_bounds_chunk_tasks() {
        let (mut sender, _sink) = pair_with(SizePolicy::Fixed(10), 2).await;
        let data = vec![3u8; 10_000];

        let summary = sender.send(&data, 1).await.unwrap();
        assert_eq!(summary.chunks, 1000);
        assert_eq!(summary.sent, summary.chunks);
        assert_eq!(summary.bytes, 10_000);
        assert!(summary.peak_in_flight <= 2, "peak {}", summary.peak_in_flight);
        assert!(summary.peak_in_flight >= 1);

        let counters = sender.streams().get(1).unwrap();
        assert_eq!(counters.packets, summary.sent as u64);
        assert_eq!(counters.bytes, summary.bytes);
    }

    #[tokio::test]
    async fn oversized_packet_size_is_capped_to_one_datagram() {
        let (mut sender, _sink) = pair(SizePolicy::Fixed(100_000)).await;
        let data = vec![9u8; MAX_DATAGRAM_PAYLOAD + 100];

        let summary = sender.send(&data, 1).await.unwrap();
        assert_eq!(summary.packet_size, MAX_DATAGRAM_PAYLOAD);
        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.sent + summary.failed, 2);

        // Only bytes that actually went out are counted.
        let counters = sender.streams().get(1).unwrap();
        assert_eq!(counters.bytes, summary.bytes);
        assert_eq!(counters.packets, summary.sent as u64);
    }

    #[tokio::test]
    async fn state_follows_send_and_close() {
        let (mut sender, _sink) = pair(SizePolicy::Fixed(10)).await;
        assert_eq!(sender.state(), SenderState::Idle);

        sender.send(b"abc", 1).await.unwrap();
        assert_eq!(sender.state(), SenderState::Idle);

        sender.close().await;
        assert_eq!(sender.state(), SenderState::CloseSent);
        assert!(matches!(
            sender.send(b"late", 1).await,
            Err(SendError::Closed)
        ));
    }

    #[tokio::test]
    async fn second_close_sends_nothing() {
        let (mut sender, sink) = pair(SizePolicy::Fixed(10)).await;
        sender.close().await;
        sender.close().await;

        let mut buf = [0u8; 32];
        let wait = RecvWait::Timeout(Duration::from_millis(200));
        assert!(sink.recv_datagram(&mut buf, wait, None).await.is_ok());
        assert!(matches!(
            sink.recv_datagram(&mut buf, wait, None).await,
            Err(SocketError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn empty_payload_sends_nothing() {
        let (mut sender, sink) = pair(SizePolicy::Fixed(10)).await;
        let summary = sender.send(b"", 3).await.unwrap();
        assert_eq!(summary.chunks, 0);
        assert!(drain(&sink).await.is_empty());
        assert_eq!(sender.streams().get(3).unwrap().packets, 0);
    }

    #[tokio::test]
    async fn control_stream_id_is_rejected() {
        let (mut sender, _sink) = pair(SizePolicy::Fixed(10)).await;
        let err = sender.send(b"x", CONTROL_STREAM_ID).await.unwrap_err();
        assert!(matches!(err, SendError::ReservedStreamId(0)));
    }

    #[tokio::test]
    async fn missing_file_sends_nothing() {
        let (mut sender, sink) = pair(SizePolicy::Fixed(10)).await;
        let err = sender
            .send_file("/no/such/input.txt", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::MissingInputFile { .. }));
        assert!(drain(&sink).await.is_empty());
        assert!(sender.streams().is_empty());
    }

    #[tokio::test]
    async fn close_sends_tagged_frame() {
        let (mut sender, sink) = pair(SizePolicy::Fixed(10)).await;
        sender.close().await;

        let mut buf = [0u8; 32];
        let (n, _) = sink
            .recv_datagram(&mut buf, RecvWait::Timeout(Duration::from_secs(5)), None)
            .await
            .unwrap();
        assert_eq!(n, HEADER_LEN);
        assert_eq!(Frame::decode(&buf[..n]).unwrap(), Frame::Close);
    }

    #[tokio::test]
    async fn legacy_close_sends_literal() {
        let (sender, sink) = pair(SizePolicy::Fixed(10)).await;
        sender.with_legacy_close(true).close().await;

        let mut buf = [0u8; 32];
        let (n, _) = sink
            .recv_datagram(&mut buf, RecvWait::Timeout(Duration::from_secs(5)), None)
            .await
            .unwrap();
        assert_eq!(&buf[..n], CLOSE_SENTINEL);
    }
}
