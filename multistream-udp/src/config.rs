//! Tunable transport parameters.
//!
//! [`TransportConfig::default`] reproduces the classic setup: loopback port
//! 5060, random packet sizes between 1000 and 2000 bytes.  The CLI overrides
//! individual fields from flags.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::streams::SizePolicy;

/// Default UDP port for both sides.
pub const DEFAULT_PORT: u16 = 5060;

/// Default cap on chunk transmissions in flight for one stream.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Largest datagram the receiver will read.
pub const DEFAULT_RECV_BUFFER: usize = 65_535;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Receiver bind address; sender destination.
    pub addr: SocketAddr,
    /// Packet-size assignment for newly seen streams.
    pub packet_size: SizePolicy,
    /// Maximum concurrent chunk sends within one stream.
    pub max_in_flight: usize,
    /// Receive buffer size in bytes.  Longer datagrams are truncated by the OS.
    pub recv_buffer: usize,
    /// Emit the headerless `close` literal instead of a tagged close frame.
    pub legacy_close: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            packet_size: SizePolicy::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            recv_buffer: DEFAULT_RECV_BUFFER,
            legacy_close: false,
        }
    }
}

impl TransportConfig {
    /// Same configuration with a different address.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Same configuration with a different packet-size policy.
    pub fn with_packet_size(mut self, policy: SizePolicy) -> Self {
        self.packet_size = policy;
        self
    }
}
