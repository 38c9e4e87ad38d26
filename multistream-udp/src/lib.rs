//! `multistream-udp` — an instrumented multi-stream datagram transport.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   data frames   ┌──────────┐
//!  │  Sender  │────────────────▶│ Receiver │
//!  └────┬─────┘   close frame   └─────┬────┘
//!       │                             │
//!  ┌────▼────────┐              ┌─────▼───────┐
//!  │ StreamTable │              │ StreamTable │   (one per side)
//!  └─────────────┘              └─────┬───────┘
//!                                     │
//!                              ┌──────▼─────────────┐
//!                              │ StatisticsSnapshot │
//!                              └────────────────────┘
//! ```
//!
//! There is no handshake, retransmission, ordering or congestion control:
//! lost chunks only show up as lower counts in the receiver's report.
//!
//! Each module has a single responsibility:
//! - [`packet`]     — wire format (serialise / deserialise)
//! - [`streams`]    — per-stream packet size and traffic counters
//! - [`sender`]     — chunking and bounded concurrent transmission
//! - [`receiver`]   — receive loop and datagram classification
//! - [`stats`]      — throughput snapshot and text report
//! - [`session`]    — per-process context owning config and stream table
//! - [`socket`]     — async UDP socket abstraction
//! - [`state`]      — sender and receiver lifecycle states
//! - [`config`]     — tunable parameters
//! - [`input`]      — input file loading and splitting
//! - [`simulator`]  — lossy relay for tests

pub mod config;
pub mod input;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod stats;
pub mod streams;

pub use config::TransportConfig;
pub use packet::{Frame, PacketError};
pub use receiver::{DataFrame, Received, Receiver};
pub use sender::{SendError, SendSummary, Sender};
pub use session::TransportSession;
pub use socket::{RecvWait, SocketError};
pub use state::{ReceiverState, SenderState};
pub use stats::StatisticsSnapshot;
pub use streams::{SizePolicy, StreamTable};
