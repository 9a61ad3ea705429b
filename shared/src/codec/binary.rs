//! Length-framed binary encoding
//!
//! ```text
//! +----------------+-----------+------------------------+
//! | size: u32 (BE) | command   | payload (size - 1)     |
//! +----------------+-----------+------------------------+
//! ```
//!
//! `size` counts the command byte and the payload. The payload is the
//! command's struct serialized with bincode using big-endian fixed-width
//! integers: strings and repeated groups carry a `u64` length prefix,
//! booleans take one byte.

use super::CodecError;
use crate::packets::{Command, Packet, PayloadReader, PayloadWriter};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Bytes taken by the size prefix
pub const HEADER_LEN: usize = 4;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

struct BincodeReader<'a> {
    bytes: &'a [u8],
    limit: u64,
}

impl PayloadReader for BincodeReader<'_> {
    type Error = bincode::Error;

    fn read<T: DeserializeOwned>(self) -> Result<T, Self::Error> {
        options().with_limit(self.limit).deserialize(self.bytes)
    }
}

struct BincodeWriter;

impl PayloadWriter for BincodeWriter {
    type Output = Vec<u8>;
    type Error = bincode::Error;

    fn write<T: Serialize>(self, payload: &T) -> Result<Self::Output, Self::Error> {
        options().serialize(payload)
    }
}

/// Decodes the first frame in `buf`
///
/// Returns [`CodecError::IncompleteFrame`] without consuming anything while
/// the declared frame is longer than what is buffered.
pub fn decode(buf: &[u8], max_frame_size: usize) -> Result<(Packet, usize), CodecError> {
    if buf.len() < HEADER_LEN {
        return Err(CodecError::IncompleteFrame);
    }

    let mut prefix = [0u8; HEADER_LEN];
    prefix.copy_from_slice(&buf[..HEADER_LEN]);
    let size = u32::from_be_bytes(prefix) as usize;

    if size == 0 {
        return Err(CodecError::MalformedMessage {
            consumed: HEADER_LEN,
            reason: "empty frame".to_string(),
        });
    }
    if size > max_frame_size {
        return Err(CodecError::FrameTooLarge {
            size,
            limit: max_frame_size,
        });
    }

    let consumed = HEADER_LEN + size;
    if buf.len() < consumed {
        return Err(CodecError::IncompleteFrame);
    }

    let command = buf[HEADER_LEN];
    let payload = &buf[HEADER_LEN + 1..consumed];

    let Some(known) = Command::from_id(u32::from(command)) else {
        let packet = Packet::Unknown {
            command: u32::from(command),
            raw: payload.to_vec(),
        };
        return Ok((packet, consumed));
    };

    let reader = BincodeReader {
        bytes: payload,
        limit: max_frame_size as u64,
    };
    Packet::read_payload(known, reader)
        .map(|packet| (packet, consumed))
        .map_err(|e| CodecError::MalformedMessage {
            consumed,
            reason: format!("{:?} payload: {}", known, e),
        })
}

/// Encodes one packet as a complete frame
pub fn encode(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let command_id = packet.command_id();
    let encode_error = |reason: String| CodecError::Encode {
        command: command_id,
        reason,
    };

    let payload = match packet.write_payload(BincodeWriter) {
        Some(result) => result.map_err(|e| encode_error(e.to_string()))?,
        None => match packet {
            Packet::Unknown { raw, .. } => raw.clone(),
            _ => return Err(encode_error("packet has no payload".to_string())),
        },
    };

    let command = u8::try_from(command_id)
        .map_err(|_| encode_error("command id does not fit in one byte".to_string()))?;
    let size = u32::try_from(payload.len() + 1)
        .map_err(|_| encode_error(format!("payload of {} bytes", payload.len())))?;

    let mut frame = Vec::with_capacity(HEADER_LEN + 1 + payload.len());
    frame.extend_from_slice(&size.to_be_bytes());
    frame.push(command);
    frame.extend_from_slice(&payload);
    Ok(frame)
}
