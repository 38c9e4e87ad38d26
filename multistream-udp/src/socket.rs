//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that sends
//! [`crate::packet::Frame`]s and reads raw datagrams with an explicit wait
//! policy.  Decoding and all protocol logic live elsewhere; this module owns
//! only byte I/O.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::packet::Frame;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// No datagram arrived within the requested wait.
    #[error("no datagram within {0:?}")]
    Timeout(Duration),
    /// The receive was cancelled through its token.
    #[error("receive cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Wait policy
// ---------------------------------------------------------------------------

/// How long a receive may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvWait {
    /// Block until a datagram arrives (or the receive is cancelled).
    Forever,
    /// Give up with [`SocketError::Timeout`] after this long.
    Timeout(Duration),
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async, datagram-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Bind an ephemeral port on the unspecified address of `peer`'s family.
    pub async fn bind_for(peer: SocketAddr) -> Result<Self, SocketError> {
        let any: SocketAddr = if peer.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        Self::bind(any).await
    }

    /// Encode `frame` and send it as a single UDP datagram to `dest`.
    ///
    /// Returns the number of bytes put on the wire.
    pub async fn send_frame(&self, frame: &Frame, dest: SocketAddr) -> Result<usize, SocketError> {
        self.send_raw(&frame.encode(), dest).await
    }

    /// Send pre-encoded bytes as a single UDP datagram to `dest`.
    pub async fn send_raw(&self, bytes: &[u8], dest: SocketAddr) -> Result<usize, SocketError> {
        Ok(self.inner.send_to(bytes, dest).await?)
    }

    /// Receive the next datagram into `buf`.
    ///
    /// Returns `(length, sender_address)`.  Datagrams longer than `buf` are
    /// truncated by the OS.
    pub async fn recv_datagram(
        &self,
        buf: &mut [u8],
        wait: RecvWait,
        cancel: Option<&CancellationToken>,
    ) -> Result<(usize, SocketAddr), SocketError> {
        match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(SocketError::Cancelled),
                result = self.recv_with_wait(buf, wait) => result,
            },
            None => self.recv_with_wait(buf, wait).await,
        }
    }

    async fn recv_with_wait(
        &self,
        buf: &mut [u8],
        wait: RecvWait,
    ) -> Result<(usize, SocketAddr), SocketError> {
        match wait {
            RecvWait::Forever => Ok(self.inner.recv_from(buf).await?),
            RecvWait::Timeout(limit) => {
                match tokio::time::timeout(limit, self.inner.recv_from(buf)).await {
                    Ok(result) => Ok(result?),
                    Err(_) => Err(SocketError::Timeout(limit)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback() -> Socket {
        Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn frame_arrives_as_one_datagram() {
        let a = loopback().await;
        let b = loopback().await;

        let frame = Frame::data(1, 0, b"abc", 100);
        let sent = a.send_frame(&frame, b.local_addr).await.unwrap();

        let mut buf = [0u8; 64];
        let (n, from) = b
            .recv_datagram(&mut buf, RecvWait::Timeout(Duration::from_secs(5)), None)
            .await
            .unwrap();
        assert_eq!(n, sent);
        assert_eq!(from, a.local_addr);
        assert_eq!(Frame::decode(&buf[..n]).unwrap(), frame);
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let s = loopback().await;
        let mut buf = [0u8; 16];
        let err = s
            .recv_datagram(&mut buf, RecvWait::Timeout(Duration::from_millis(20)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SocketError::Timeout(_)));
    }

    #[tokio::test]
    async fn cancellation_interrupts_blocking_receive() {
        let s = loopback().await;
        let token = CancellationToken::new();
        token.cancel();

        let mut buf = [0u8; 16];
        let err = s
            .recv_datagram(&mut buf, RecvWait::Forever, Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, SocketError::Cancelled));
    }
}
