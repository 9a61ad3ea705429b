//! Newline-delimited JSON encoding
//!
//! Each packet is one JSON object on its own line. The command identifier
//! travels under [`COMMAND_KEY`], the payload fields under their own names:
//!
//! ```text
//! {"_command":2,"name":"stepmania-json","version":41}
//! ```

use super::CodecError;
use crate::packets::{Command, Packet, PayloadReader, PayloadWriter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Key holding the command identifier
pub const COMMAND_KEY: &str = "_command";

struct ValueReader(Value);

impl PayloadReader for ValueReader {
    type Error = serde_json::Error;

    fn read<T: DeserializeOwned>(self) -> Result<T, Self::Error> {
        serde_json::from_value(self.0)
    }
}

struct ValueWriter;

impl PayloadWriter for ValueWriter {
    type Output = Value;
    type Error = serde_json::Error;

    fn write<T: Serialize>(self, payload: &T) -> Result<Self::Output, Self::Error> {
        serde_json::to_value(payload)
    }
}

/// Decodes the first non-blank line in `buf`
///
/// A malformed line is reported with the number of bytes to skip, which
/// includes any blank lines in front of it and its newline.
pub fn decode(buf: &[u8], max_line_size: usize) -> Result<(Packet, usize), CodecError> {
    let mut start = 0;

    loop {
        let rest = &buf[start..];
        let Some(newline) = rest.iter().position(|b| *b == b'\n') else {
            if rest.len() > max_line_size {
                return Err(CodecError::FrameTooLarge {
                    size: rest.len(),
                    limit: max_line_size,
                });
            }
            return Err(CodecError::IncompleteFrame);
        };

        let consumed = start + newline + 1;
        let line = rest[..newline].trim_ascii();
        if line.is_empty() {
            start = consumed;
            continue;
        }
        if line.len() > max_line_size {
            return Err(CodecError::FrameTooLarge {
                size: line.len(),
                limit: max_line_size,
            });
        }

        return decode_line(line)
            .map(|packet| (packet, consumed))
            .map_err(|reason| CodecError::MalformedMessage { consumed, reason });
    }
}

fn decode_line(line: &[u8]) -> Result<Packet, String> {
    let mut fields = match serde_json::from_slice::<Value>(line) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => return Err(format!("expected an object, got {}", other)),
        Err(e) => return Err(e.to_string()),
    };

    let command = fields
        .remove(COMMAND_KEY)
        .and_then(|value| value.as_u64())
        .ok_or_else(|| format!("missing or invalid {}", COMMAND_KEY))?;
    let command = u32::try_from(command).map_err(|_| format!("command {} out of range", command))?;

    match Command::from_id(command) {
        Some(known) => Packet::read_payload(known, ValueReader(Value::Object(fields)))
            .map_err(|e| format!("{:?} payload: {}", known, e)),
        None => Ok(Packet::Unknown {
            command,
            raw: line.to_vec(),
        }),
    }
}

/// Encodes one packet as a newline-terminated line
pub fn encode(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let command = packet.command_id();
    let encode_error = |reason: String| CodecError::Encode { command, reason };

    let mut line = match packet.write_payload(ValueWriter) {
        Some(result) => {
            let mut fields = match result.map_err(|e| encode_error(e.to_string()))? {
                Value::Object(fields) => fields,
                other => return Err(encode_error(format!("payload is not an object: {}", other))),
            };
            let mut object = Map::with_capacity(fields.len() + 1);
            object.insert(COMMAND_KEY.to_string(), Value::from(command));
            object.append(&mut fields);
            serde_json::to_vec(&Value::Object(object)).map_err(|e| encode_error(e.to_string()))?
        }
        None => match packet {
            Packet::Unknown { raw, .. } => raw.clone(),
            _ => return Err(encode_error("packet has no payload".to_string())),
        },
    };

    line.push(b'\n');
    Ok(line)
}
