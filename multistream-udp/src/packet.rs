//! Wire-format definitions for stream frames.
//!
//! Every datagram exchanged between peers is a [`Frame`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, payload).
//! - Serialising a [`Frame`] into a byte buffer ready for transmission,
//!   truncating oversized payloads to the caller's cap.
//! - Deserialising a raw byte slice back into a [`Frame`], returning errors
//!   for malformed or truncated input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Stream ID                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Frame Offset                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Payload Length        |          Payload ...          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 10 bytes.
//! stream_id(4) + frame_offset(4) + payload_len(2)
//!
//! # Control frames
//!
//! Stream id [`CONTROL_STREAM_ID`] is reserved.  A header carrying it with an
//! empty payload is [`Frame::Close`].  The bare 5-byte literal
//! [`CLOSE_SENTINEL`] is also accepted as a close and is matched before any
//! header parsing takes place.

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 10;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Largest payload that still fits one IPv4 UDP datagram (65 507 bytes)
/// together with the header.
pub const MAX_DATAGRAM_PAYLOAD: usize = 65_507 - HEADER_LEN;

/// Stream id reserved for control frames; never carries data.
pub const CONTROL_STREAM_ID: u32 = 0;

/// Headerless close message understood by older peers.
pub const CLOSE_SENTINEL: &[u8; 5] = b"close";

// Byte offsets of each field within the serialised header.
const OFF_STREAM_ID: usize = 0;
const OFF_FRAME_OFFSET: usize = 4;
const OFF_PAYLOAD_LEN: usize = 8;

/// A complete protocol datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One chunk of a stream's payload.
    Data {
        stream_id: u32,
        /// Byte offset of `payload` within the stream's original data.
        frame_offset: u32,
        payload: Vec<u8>,
    },
    /// End of transmission.
    Close,
}

impl Frame {
    /// Build a data frame, truncating `payload` to at most `cap` bytes.
    ///
    /// Truncation is silent: callers pass the stream's packet size and rely
    /// on having already chunked the data to fit.
    pub fn data(stream_id: u32, frame_offset: u32, payload: &[u8], cap: usize) -> Self {
        let len = payload.len().min(cap).min(MAX_PAYLOAD);
        Frame::Data {
            stream_id,
            frame_offset,
            payload: payload[..len].to_vec(),
        }
    }

    /// `true` for [`Frame::Close`].
    pub fn is_close(&self) -> bool {
        matches!(self, Frame::Close)
    }

    /// Serialise this frame into a newly allocated byte vector.
    ///
    /// A data payload longer than [`MAX_PAYLOAD`] is cut to fit the length
    /// field; the length field always matches the bytes written.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Data {
                stream_id,
                frame_offset,
                payload,
            } => write_frame(*stream_id, *frame_offset, payload),
            Frame::Close => write_frame(CONTROL_STREAM_ID, 0, &[]),
        }
    }

    /// Parse a [`Frame`] from a raw datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`] (and is not the close sentinel),
    /// - the `payload_len` field claims more bytes than remain, or
    /// - the reserved control stream id carries a payload.
    ///
    /// Bytes past the declared payload are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if is_close_sentinel(buf) {
            return Ok(Frame::Close);
        }
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort { len: buf.len() });
        }

        let stream_id = read_u32(buf, OFF_STREAM_ID);
        let frame_offset = read_u32(buf, OFF_FRAME_OFFSET);
        let payload_len =
            u16::from_be_bytes([buf[OFF_PAYLOAD_LEN], buf[OFF_PAYLOAD_LEN + 1]]) as usize;

        let remaining = buf.len() - HEADER_LEN;
        if payload_len > remaining {
            return Err(PacketError::LengthMismatch {
                declared: payload_len,
                remaining,
            });
        }

        if stream_id == CONTROL_STREAM_ID {
            return if payload_len == 0 {
                Ok(Frame::Close)
            } else {
                Err(PacketError::ReservedStreamId)
            };
        }

        Ok(Frame::Data {
            stream_id,
            frame_offset,
            payload: buf[HEADER_LEN..HEADER_LEN + payload_len].to_vec(),
        })
    }
}

/// Encode a data frame for `stream_id` in one step.
///
/// Equivalent to `Frame::data(..).encode()`.
pub fn encode_data(stream_id: u32, frame_offset: u32, payload: &[u8], cap: usize) -> Vec<u8> {
    let len = payload.len().min(cap).min(MAX_PAYLOAD);
    write_frame(stream_id, frame_offset, &payload[..len])
}

/// `true` when `buf` is exactly the legacy close literal.
pub fn is_close_sentinel(buf: &[u8]) -> bool {
    buf == CLOSE_SENTINEL
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Buffer shorter than the fixed header size.
    #[error("buffer of {len} bytes is too short to contain a header")]
    BufferTooShort { len: usize },
    /// `payload_len` field claims more bytes than the datagram holds.
    #[error("payload_len field claims {declared} bytes but only {remaining} remain")]
    LengthMismatch { declared: usize, remaining: usize },
    /// A payload was attached to the control stream id.
    #[error("reserved control stream id carries a payload")]
    ReservedStreamId,
}

fn write_frame(stream_id: u32, frame_offset: u32, payload: &[u8]) -> Vec<u8> {
    let payload = &payload[..payload.len().min(MAX_PAYLOAD)];
    let mut buf = vec![0u8; HEADER_LEN + payload.len()];

    buf[OFF_STREAM_ID..OFF_STREAM_ID + 4].copy_from_slice(&stream_id.to_be_bytes());
    buf[OFF_FRAME_OFFSET..OFF_FRAME_OFFSET + 4].copy_from_slice(&frame_offset.to_be_bytes());
    buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 2]
        .copy_from_slice(&(payload.len() as u16).to_be_bytes());
    buf[HEADER_LEN..].copy_from_slice(payload);

    buf
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
