//! Per-process transport context.
//!
//! A [`TransportSession`] owns the configuration and the one [`StreamTable`]
//! of its side of the transfer.  It hands out [`Sender`]s and [`Receiver`]s
//! that share that table, and produces the final report from it.
//!
//! Sender and receiver processes each build their own session; nothing is
//! shared between them except datagrams.
//!
//! ```ignore
//! let session = TransportSession::new(TransportConfig::default());
//! let mut sender = session.sender().await?;
//! sender.send(b"payload", 1).await?;
//! sender.close().await;
//! println!("{}", session.generate_report());
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::TransportConfig;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::socket::SocketError;
use crate::stats::{generate_report, StatisticsSnapshot};
use crate::streams::StreamTable;

#[derive(Debug)]
pub struct TransportSession {
    config: TransportConfig,
    streams: Arc<StreamTable>,
}

impl Default for TransportSession {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl TransportSession {
    pub fn new(config: TransportConfig) -> Self {
        let streams = Arc::new(StreamTable::new(config.packet_size));
        Self { config, streams }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// The stream table shared by everything this session hands out.
    pub fn streams(&self) -> &Arc<StreamTable> {
        &self.streams
    }

    /// A sender targeting `config.addr` from an ephemeral local port.
    pub async fn sender(&self) -> Result<Sender, SocketError> {
        self.sender_to(self.config.addr).await
    }

    /// A sender targeting `dest` instead of the configured address.
    pub async fn sender_to(&self, dest: SocketAddr) -> Result<Sender, SocketError> {
        let sender =
            Sender::bind(dest, Arc::clone(&self.streams), self.config.max_in_flight).await?;
        Ok(sender.with_legacy_close(self.config.legacy_close))
    }

    /// A receiver bound to `config.addr`.
    pub async fn receiver(&self) -> Result<Receiver, SocketError> {
        Receiver::bind(
            self.config.addr,
            Arc::clone(&self.streams),
            self.config.recv_buffer,
        )
        .await
    }

    /// Statistics for every stream this session has touched.
    pub fn generate_report(&self) -> StatisticsSnapshot {
        generate_report(&self.streams)
    }
}
