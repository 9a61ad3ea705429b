//! Live client connections and their session state
//!
//! Every [`Connection`] owns exactly one lock, guarding its [`Session`]. The
//! only way to reach the session is [`Connection::with_session`], which runs
//! a closure under the lock and refuses (in debug builds) to be nested: a
//! thread never holds two session locks at once, so simultaneous start
//! requests from different players cannot deadlock each other.

use crate::room::RoomId;
use crate::storage::{SongId, UserId};
use crate::utils::get_timestamp;
use log::debug;
use shared::{Encoding, GameStatusUpdate, Packet};
use std::cell::Cell;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use tokio::sync::{mpsc, Notify};

/// Screen a user is currently on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserStatus {
    Spectator = 0,
    #[default]
    RoomSelection = 1,
    MusicSelection = 2,
    Option = 3,
    Evaluation = 4,
}

impl UserStatus {
    /// Maps the action byte of a screen status packet
    pub fn from_screen_action(action: u8) -> Option<Self> {
        match action {
            1 => Some(UserStatus::MusicSelection),
            3 => Some(UserStatus::Option),
            5 => Some(UserStatus::Evaluation),
            7 => Some(UserStatus::RoomSelection),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UserStatus::Spectator => "spectator",
            UserStatus::RoomSelection => "room selection",
            UserStatus::MusicSelection => "music selection",
            UserStatus::Option => "option",
            UserStatus::Evaluation => "evaluation",
        }
    }
}

/// Authenticated user bound to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: UserId,
    pub name: String,
}

/// Options and progress of one player slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerSlot {
    pub feet: u8,
    pub difficulty: u8,
    pub options: String,
    pub progress: Vec<GameStatusUpdate>,
}

/// Start handshake data for the song a connection asked to play
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameStart {
    pub players: [PlayerSlot; 2],
    pub song_options: String,
    pub course_title: String,
    pub requested_at: u64,
    /// Set once the room barrier releases
    pub start_at: Option<u64>,
}

/// Mutable per-connection state
#[derive(Debug, Default)]
pub struct Session {
    pub client_name: Option<String>,
    pub client_version: Option<u8>,
    pub user: Option<SessionUser>,
    pub room: Option<RoomId>,
    pub online: bool,
    /// True while a start request for `song` waits on the room barrier
    pub ready: bool,
    pub song: Option<SongId>,
    pub game: Option<GameStart>,
    pub status: UserStatus,
    pub last_seen: u64,
}

impl Session {
    /// Clears every room-scoped field and returns the room that was left
    pub fn leave_room(&mut self) -> Option<RoomId> {
        self.ready = false;
        self.song = None;
        self.game = None;
        self.status = UserStatus::RoomSelection;
        self.room.take()
    }

    /// Ends the current song without leaving the room
    pub fn end_song(&mut self) -> Option<SongId> {
        self.ready = false;
        self.game = None;
        self.song.take()
    }
}

thread_local! {
    static SESSION_LOCKS_HELD: Cell<usize> = const { Cell::new(0) };
}

/// Tracks session locks held by the current thread
struct HeldLock;

impl HeldLock {
    fn acquire() -> Self {
        SESSION_LOCKS_HELD.with(|held| {
            debug_assert_eq!(
                held.get(),
                0,
                "a session lock is already held by this thread"
            );
            held.set(held.get() + 1);
        });
        HeldLock
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        SESSION_LOCKS_HELD.with(|held| held.set(held.get().saturating_sub(1)));
    }
}

/// One live client socket
pub struct Connection {
    token: String,
    addr: SocketAddr,
    encoding: Encoding,
    outbound: mpsc::UnboundedSender<Packet>,
    shutdown: Notify,
    session: Mutex<Session>,
}

impl Connection {
    /// Creates a connection whose outgoing packets are queued on `outbound`
    pub fn new(
        addr: SocketAddr,
        encoding: Encoding,
        outbound: mpsc::UnboundedSender<Packet>,
    ) -> Self {
        let session = Session {
            last_seen: get_timestamp(),
            ..Session::default()
        };

        Self {
            token: uuid::Uuid::new_v4().to_string(),
            addr,
            encoding,
            outbound,
            shutdown: Notify::new(),
            session: Mutex::new(session),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Runs `f` under this connection's lock
    ///
    /// Must not be called from inside another `with_session` closure.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let _held = HeldLock::acquire();
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut session)
    }

    /// Queues a packet for the writer task; false once the socket is gone
    pub fn send(&self, packet: impl Into<Packet>) -> bool {
        let packet = packet.into();
        let command = packet.command_id();
        if self.outbound.send(packet).is_err() {
            debug!("Dropping command {} for closed connection {}", command, self.addr);
            return false;
        }
        true
    }

    /// Asks the connection task to stop
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// Resolves once [`Connection::close`] has been called
    pub async fn closed(&self) {
        self.shutdown.notified().await;
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.with_session(|s| s.user.clone())
    }

    pub fn room(&self) -> Option<RoomId> {
        self.with_session(|s| s.room)
    }

    pub fn is_ready(&self) -> bool {
        self.with_session(|s| s.ready)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("token", &self.token)
            .field("addr", &self.addr)
            .field("encoding", &self.encoding)
            .finish()
    }
}
