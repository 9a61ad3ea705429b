//! Wire codec for the two transport encodings
//!
//! Both encodings share one contract: `decode` takes whatever bytes have been
//! buffered so far and returns the first complete packet together with the
//! number of bytes it occupied, and `encode` produces the bytes of exactly
//! one packet. A connection is pinned to one [`Encoding`] for its lifetime.

pub mod binary;
pub mod json;

use crate::packets::Packet;
use thiserror::Error;

/// Largest frame or line accepted by default (1 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 20;

/// Decode and encode failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The buffer does not hold a whole packet yet; nothing was consumed
    #[error("incomplete frame")]
    IncompleteFrame,

    /// One packet could not be parsed; skip `consumed` bytes and carry on
    #[error("malformed message ({consumed} bytes): {reason}")]
    MalformedMessage { consumed: usize, reason: String },

    /// The peer announced a frame larger than the configured limit
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("cannot encode command {command}: {reason}")]
    Encode { command: u32, reason: String },
}

/// Transport encoding negotiated by the listener a client connected to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Length-framed binary packets
    Binary,
    /// Newline-delimited JSON objects
    Json,
}

impl Encoding {
    /// Decodes the first packet in `buf` using the default size limit
    pub fn decode(self, buf: &[u8]) -> Result<(Packet, usize), CodecError> {
        self.decode_with_limit(buf, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn decode_with_limit(
        self,
        buf: &[u8],
        max_frame_size: usize,
    ) -> Result<(Packet, usize), CodecError> {
        match self {
            Encoding::Binary => binary::decode(buf, max_frame_size),
            Encoding::Json => json::decode(buf, max_frame_size),
        }
    }

    pub fn encode(self, packet: &Packet) -> Result<Vec<u8>, CodecError> {
        match self {
            Encoding::Binary => binary::encode(packet),
            Encoding::Json => json::encode(packet),
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Encoding::Binary => write!(f, "binary"),
            Encoding::Json => write!(f, "json"),
        }
    }
}
