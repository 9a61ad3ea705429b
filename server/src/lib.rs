//! # Session Server Library
//!
//! Multiplayer session server for a rhythm game. It accepts client
//! connections over a binary and a JSON encoding of the same protocol,
//! tracks each connection's session, routes packets to command handlers and
//! starts songs at the same moment for every player of a room.
//!
//! ## Architecture
//!
//! ### Connections and sessions
//! Each socket is a [`connection::Connection`] owning a single lock around
//! its [`connection::Session`]. Handlers never hold two of these locks at
//! once; any query across connections reads them one at a time.
//!
//! ### Registry
//! The [`registry::SessionRegistry`] is the set of live connections with a
//! room index. It has its own lock and is only ever used to take snapshots.
//!
//! ### Dispatch
//! The [`dispatcher::Dispatcher`] maps command ids to handler factories and
//! enforces login, room and privilege preconditions before a handler runs.
//! Handler failures, panics included, drop the message but never the
//! connection.
//!
//! ### Room start barrier
//! Rooms cycle through idle, song selection and playing
//! ([`room::RoomStatus`]). Every start request polls the room; the request
//! that finds all participants ready releases the song for everybody with
//! one shared start time ([`handlers::game_start`]).
//!
//! ### Network
//! [`network::NetworkServer`] runs the TCP listeners, one reader and one
//! writer task per socket, and the keepalive.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::dispatcher::Dispatcher;
//! use server::facade::Server;
//! use server::network::NetworkServer;
//! use server::storage::MemoryStorage;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Arc::new(Server::new(
//!         ServerConfig::default(),
//!         Arc::new(MemoryStorage::new()),
//!     ));
//!     let dispatcher = Arc::new(Dispatcher::with_default_handlers());
//!
//!     // Serves both encodings until ctrl-c
//!     NetworkServer::bind(server, dispatcher).await?.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod facade;
pub mod handlers;
pub mod network;
pub mod registry;
pub mod room;
pub mod storage;
pub mod utils;
