//! # Shared protocol
//!
//! Packet definitions and the wire codec used by the session server and by
//! test clients. The server speaks two encodings of the same packet set:
//!
//! - **Binary**: `u32` big-endian frame size, one command byte, then the
//!   payload fields in declaration order.
//! - **JSON**: one object per line, `_command` plus the payload fields by
//!   name.
//!
//! ```
//! use shared::{ClientHello, Encoding, Packet};
//!
//! let hello = Packet::from(ClientHello { version: 40, name: "stepmania".to_string() });
//! for encoding in [Encoding::Binary, Encoding::Json] {
//!     let bytes = encoding.encode(&hello).unwrap();
//!     let (decoded, consumed) = encoding.decode(&bytes).unwrap();
//!     assert_eq!(decoded, hello);
//!     assert_eq!(consumed, bytes.len());
//! }
//! ```

pub mod codec;
pub mod packets;

pub use codec::{CodecError, Encoding, DEFAULT_MAX_FRAME_SIZE};
pub use packets::*;

/// Protocol version announced in the server hello
pub const PROTOCOL_VERSION: u8 = 128;
