//! Inbound side: the receive loop.
//!
//! The [`Receiver`] reads one datagram at a time and classifies it:
//! - a close frame (tagged, or the legacy literal) ends the session;
//! - a data frame is counted in the receiver's [`StreamTable`] and handed
//!   back to the caller;
//! - anything that fails to decode is reported as [`Received::Invalid`] and
//!   the caller keeps looping.
//!
//! No reassembly is done.  Chunks are returned in arrival order with their
//! frame offset; lost chunks simply never show up in the counters.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::packet::{Frame, PacketError};
use crate::socket::{RecvWait, Socket, SocketError};
use crate::state::ReceiverState;
use crate::streams::StreamTable;

/// A decoded data chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: u32,
    pub frame_offset: u32,
    pub payload: Vec<u8>,
    /// Address the datagram came from.
    pub from: SocketAddr,
}

/// Result of reading one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Data(DataFrame),
    /// The peer finished sending.
    Close,
    /// The datagram was not a valid frame and was skipped.
    Invalid(PacketError),
}

/// Totals from [`Receiver::run_until_close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiveSummary {
    /// Data frames accepted.
    pub frames: u64,
    /// Payload bytes in accepted frames.
    pub bytes: u64,
    /// Datagrams that failed to decode.
    pub invalid: u64,
}

/// Receive half of a transfer.
#[derive(Debug)]
pub struct Receiver {
    socket: Socket,
    streams: Arc<StreamTable>,
    buf: Vec<u8>,
    cancel: Option<CancellationToken>,
    state: ReceiverState,
}

impl Receiver {
    /// Wrap an already bound socket.  `recv_buffer` is the largest datagram
    /// read in full.
    pub fn new(socket: Socket, streams: Arc<StreamTable>, recv_buffer: usize) -> Self {
        Self {
            socket,
            streams,
            buf: vec![0u8; recv_buffer.max(1)],
            cancel: None,
            state: ReceiverState::Listening,
        }
    }

    /// Bind `addr` and start listening.
    pub async fn bind(
        addr: SocketAddr,
        streams: Arc<StreamTable>,
        recv_buffer: usize,
    ) -> Result<Self, SocketError> {
        let socket = Socket::bind(addr).await?;
        log::info!("[recv] listening on {}", socket.local_addr);
        Ok(Self::new(socket, streams, recv_buffer))
    }

    /// Abort any pending [`recv_next`](Self::recv_next) when `token` is
    /// cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// The receive-side stream table.
    pub fn streams(&self) -> &Arc<StreamTable> {
        &self.streams
    }

    /// Read and classify the next datagram.
    ///
    /// Only transport failures, timeouts and cancellation are errors; a
    /// malformed datagram yields `Ok(Received::Invalid(_))`.
    pub async fn recv_next(&mut self, wait: RecvWait) -> Result<Received, SocketError> {
        let (n, from) = self
            .socket
            .recv_datagram(&mut self.buf, wait, self.cancel.as_ref())
            .await?;
        let datagram = self.buf[..n].to_vec();
        Ok(self.handle_datagram(&datagram, from))
    }

    /// Classify one datagram and update the stream counters.
    pub fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr) -> Received {
        match Frame::decode(datagram) {
            Ok(Frame::Close) => {
                log::info!("[recv] close from {from}");
                self.state = ReceiverState::CloseReceived;
                Received::Close
            }
            Ok(Frame::Data {
                stream_id,
                frame_offset,
                payload,
            }) => {
                self.streams.record_receive(stream_id, payload.len());
                log::debug!(
                    "[recv] ← {from} stream={stream_id} offset={frame_offset} len={}",
                    payload.len()
                );
                Received::Data(DataFrame {
                    stream_id,
                    frame_offset,
                    payload,
                    from,
                })
            }
            Err(e) => {
                log::warn!("[recv] invalid packet ({} bytes) from {from}: {e}", datagram.len());
                Received::Invalid(e)
            }
        }
    }

    /// Keep receiving until the peer closes.
    ///
    /// `wait` applies to each individual read, so a timeout means the peer
    /// went quiet for that long.
    pub async fn run_until_close(&mut self, wait: RecvWait) -> Result<ReceiveSummary, SocketError> {
        let mut summary = ReceiveSummary::default();
        loop {
            match self.recv_next(wait).await? {
                Received::Close => return Ok(summary),
                Received::Data(frame) => {
                    summary.frames += 1;
                    summary.bytes += frame.payload.len() as u64;
                }
                Received::Invalid(_) => summary.invalid += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{encode_data, CLOSE_SENTINEL};
    use crate::streams::SizePolicy;

    async fn receiver() -> Receiver {
        let streams = Arc::new(StreamTable::new(SizePolicy::Fixed(1000)));
        Receiver::bind("127.0.0.1:0".parse().unwrap(), streams, 2048)
            .await
            .unwrap()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn valid_packet_is_counted() {
        let mut rx = receiver().await;
        let bytes = encode_data(1, 0, b"Test payload", 1000);

        let got = rx.handle_datagram(&bytes, peer());
        assert_eq!(
            got,
            Received::Data(DataFrame {
                stream_id: 1,
                frame_offset: 0,
                payload: b"Test payload".to_vec(),
                from: peer(),
            })
        );

        let counters = rx.streams().get(1).unwrap();
        assert_eq!(counters.bytes, 12);
        assert_eq!(counters.packets, 1);
        assert!(counters.first_activity.is_some());
        assert!(counters.last_activity.is_some());
        assert_eq!(rx.state(), ReceiverState::Listening);
    }

    #[tokio::test]
    async fn short_datagram_is_invalid_not_fatal() {
        let mut rx = receiver().await;
        let got = rx.handle_datagram(&[0x00, 0x00], peer());
        assert!(matches!(got, Received::Invalid(PacketError::BufferTooShort { len: 2 })));
        assert!(rx.streams().is_empty());

        let next = rx.handle_datagram(&encode_data(2, 0, b"ok", 1000), peer());
        assert!(matches!(next, Received::Data(_)));
    }

    #[tokio::test]
    async fn literal_close_is_recognised() {
        let mut rx = receiver().await;
        assert_eq!(rx.handle_datagram(CLOSE_SENTINEL, peer()), Received::Close);
        assert_eq!(rx.state(), ReceiverState::CloseReceived);
        assert!(rx.streams().is_empty());
    }

    #[tokio::test]
    async fn tagged_close_is_recognised() {
        let mut rx = receiver().await;
        assert_eq!(rx.handle_datagram(&Frame::Close.encode(), peer()), Received::Close);
    }

    #[tokio::test]
    async fn cancelled_receive_returns_error() {
        let token = CancellationToken::new();
        let mut rx = receiver().await.with_cancellation(token.clone());
        token.cancel();
        let err = rx.recv_next(RecvWait::Forever).await.unwrap_err();
        assert!(matches!(err, SocketError::Cancelled));
    }
}
