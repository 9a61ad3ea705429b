//! Error types for the session server

use shared::CodecError;
use thiserror::Error;

/// Failures reported by a [`Storage`](crate::storage::Storage) implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("room '{0}' already exists")]
    RoomExists(String),

    #[error("unknown room #{0}")]
    UnknownRoom(u32),

    #[error("user '{0}' already exists")]
    UserExists(String),

    #[error("unknown user #{0}")]
    UnknownUser(u32),
}

/// Failure raised by a handler; the message is dropped, the connection survives
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Fatal errors of the network layer
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("server is full ({0} connections)")]
    Full(usize),
}
