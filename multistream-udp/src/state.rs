//! Lifecycle states of the two ends of a transfer.
//!
//! There is no shared session between the two peers; each side walks its own
//! small state machine and the two synchronise only through wire traffic.
//!
//! ```text
//!  sender:    IDLE ──send()──▶ SENDING ──all chunks joined──▶ IDLE ──close()──▶ CLOSE_SENT
//!
//!  receiver:  LISTENING ──data / invalid──▶ LISTENING
//!               │
//!               └──close frame──▶ CLOSE_RECEIVED
//! ```
//!
//! `CLOSE_SENT` is terminal: further sends are refused and a second close
//! puts nothing on the wire.  Reporting and termination after
//! `CLOSE_RECEIVED` belong to the driver.

/// Send-side state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Between streams.
    #[default]
    Idle,
    /// Chunk tasks of a stream are in flight.  A sender left here had its
    /// `send` future dropped before every chunk was joined.
    Sending,
    /// The close frame has been transmitted.
    CloseSent,
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Sending => "SENDING",
            Self::CloseSent => "CLOSE_SENT",
        };
        f.write_str(name)
    }
}

/// Receive-side state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// Reading datagrams.
    #[default]
    Listening,
    /// The peer's close frame arrived.
    CloseReceived,
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Listening => "LISTENING",
            Self::CloseReceived => "CLOSE_RECEIVED",
        };
        f.write_str(name)
    }
}
