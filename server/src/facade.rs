//! Server facade used by handlers
//!
//! Thin glue over the [`SessionRegistry`] and the [`Storage`] collaborator:
//! set queries go to the registry, sends go to each connection's outbound
//! queue. The facade holds no locks of its own.

use crate::config::ServerConfig;
use crate::connection::{Connection, Session, UserStatus};
use crate::error::ServerError;
use crate::handlers::game_start::poll_barrier;
use crate::registry::SessionRegistry;
use crate::room::{Room, RoomId, RoomStatus};
use crate::storage::{SongId, Storage};
use log::{debug, info, warn};
use shared::{EnterRoomResponse, Packet, RoomEntry, RoomList, SystemMessage, UserEntry, UserList};
use std::sync::Arc;

pub struct Server {
    config: ServerConfig,
    registry: SessionRegistry,
    storage: Arc<dyn Storage>,
}

impl Server {
    pub fn new(config: ServerConfig, storage: Arc<dyn Storage>) -> Self {
        Self {
            registry: SessionRegistry::new(config.max_connections),
            config,
            storage,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Connections in `room`, restricted to those holding `song` when given
    pub fn connections_in(&self, room: RoomId, song: Option<SongId>) -> Vec<Arc<Connection>> {
        match song {
            Some(song) => self.registry.find_in_room(room, |s| s.song == Some(song)),
            None => self.registry.find_in_room(room, |_| true),
        }
    }

    /// Logged-in connections that are not in a room
    pub fn lobby_connections(&self) -> Vec<Arc<Connection>> {
        self.registry.find(|s| s.user.is_some() && s.room.is_none())
    }

    pub fn broadcast(&self, connections: &[Arc<Connection>], packet: impl Into<Packet>) {
        let packet = packet.into();
        for conn in connections {
            conn.send(packet.clone());
        }
    }

    /// Online users, in `room` when given
    pub fn user_count(&self, room: Option<RoomId>) -> usize {
        let online = |s: &Session| s.user.is_some() && s.online;
        match room {
            Some(room) => self.registry.find_in_room(room, online).len(),
            None => self.registry.find(online).len(),
        }
    }

    /// Sends a system message to every member of `room`
    pub fn room_message(&self, room: RoomId, message: &str) {
        self.broadcast(
            &self.connections_in(room, None),
            SystemMessage {
                message: message.to_string(),
            },
        );
    }

    /// Pushes the member list of `room` (or of the lobby) to its members
    pub fn send_user_list(&self, room: Option<RoomId>) {
        let members = match room {
            Some(room) => self.connections_in(room, None),
            None => self.lobby_connections(),
        };

        let mut users: Vec<UserEntry> = members
            .iter()
            .filter_map(|conn| {
                conn.with_session(|s| {
                    s.user.as_ref().map(|user| UserEntry {
                        status: s.status as u8,
                        name: user.name.clone(),
                    })
                })
            })
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));

        self.broadcast(
            &members,
            UserList {
                max_players: self.config.max_players,
                users,
            },
        );
    }

    pub fn room_list(&self) -> RoomList {
        let rooms = self
            .storage
            .rooms()
            .into_iter()
            .map(|room| RoomEntry {
                player_count: u16::try_from(self.user_count(Some(room.id))).unwrap_or(u16::MAX),
                status: room.status() as u8,
                title: room.name,
                description: room.description,
            })
            .collect();
        RoomList { rooms }
    }

    /// Moves `conn` into `room`, leaving its current room first
    pub fn join_room(&self, conn: &Arc<Connection>, room: &Room) {
        if conn.room() == Some(room.id) {
            return;
        }
        self.leave_room(conn);

        let name = conn.with_session(|s| {
            s.room = Some(room.id);
            s.status = UserStatus::RoomSelection;
            s.user.as_ref().map(|u| u.name.clone())
        });
        self.registry.index_join(conn.token(), room.id);
        info!("{} entered room '{}'", conn.addr(), room.name);

        conn.send(EnterRoomResponse {
            entered: true,
            room_name: room.name.clone(),
        });
        if let Some(name) = name {
            self.room_message(room.id, &format!("{} joined the room", name));
        }
        self.send_user_list(Some(room.id));
        self.send_user_list(None);
    }

    /// Takes `conn` out of its room
    ///
    /// The session is cleared first, so a barrier check running concurrently
    /// in another context no longer counts this connection. The start of the
    /// song it held is then polled again for the members that remain.
    pub fn leave_room(&self, conn: &Arc<Connection>) -> Option<RoomId> {
        let (room, song, name) = conn.with_session(|s| {
            let song = s.song;
            let room = s.leave_room();
            (room, song, s.user.as_ref().map(|u| u.name.clone()))
        });
        let room = room?;
        self.registry.index_leave(conn.token(), room);
        debug!("{} left room #{}", conn.addr(), room);

        conn.send(EnterRoomResponse {
            entered: false,
            room_name: String::new(),
        });
        if let Some(name) = name {
            self.room_message(room, &format!("{} left the room", name));
        }
        if let Some(song) = song {
            if let Err(e) = poll_barrier(self, room, song) {
                warn!("Failed to start song #{} in room #{}: {}", song, room, e);
            }
        }
        self.settle_room(room);
        self.send_user_list(Some(room));
        self.send_user_list(None);
        Some(room)
    }

    /// Idles `room` once nobody is left playing its song
    ///
    /// The room only idles if it is still doing what was observed here, so a
    /// play that started in the meantime is left alone. Members that asked
    /// to start another song while the room was busy are polled afterwards.
    pub fn settle_room(&self, room: RoomId) {
        let Some(current) = self.storage.room(room) else {
            return;
        };
        let expected = current.active_song();

        let finished = match current.status() {
            RoomStatus::Idle => false,
            RoomStatus::SelectingSong => self.connections_in(room, None).is_empty(),
            RoomStatus::Playing => {
                let song = current.active_song();
                // Ready members are mid-release and count as playing
                self.registry
                    .find_in_room(room, |s| {
                        s.song == song
                            && (s.ready || s.game.as_ref().is_some_and(|g| g.start_at.is_some()))
                    })
                    .is_empty()
            }
        };

        if !finished {
            return;
        }
        match self.storage.finish_song(room, expected) {
            Ok(true) => info!("Room '{}' is back to idle", current.name),
            Ok(false) => {
                debug!("Room '{}' moved on before it could idle", current.name);
                return;
            }
            Err(e) => {
                warn!("Failed to idle room #{}: {}", room, e);
                return;
            }
        }

        let mut waiting: Vec<SongId> = self
            .connections_in(room, None)
            .iter()
            .filter_map(|conn| conn.with_session(|s| s.song.filter(|_| s.ready)))
            .collect();
        waiting.sort_unstable();
        waiting.dedup();

        for song in waiting {
            match poll_barrier(self, room, song) {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => warn!("Failed to start song #{} in room #{}: {}", song, room, e),
            }
        }
    }

    /// Unbinds the user of `conn` and marks it offline
    pub fn logout(&self, conn: &Arc<Connection>) {
        self.leave_room(conn);
        let user = conn.with_session(|s| {
            s.online = false;
            s.user.take()
        });

        if let Some(user) = user {
            info!("User '{}' logged out", user.name);
            if let Err(e) = self.storage.set_user_online(user.id, false) {
                warn!("Failed to mark '{}' offline: {}", user.name, e);
            }
            self.send_user_list(None);
        }
    }

    pub fn connect(&self, conn: Arc<Connection>) -> Result<(), ServerError> {
        self.registry.register(conn)
    }

    /// Tears down the session of a closed socket
    pub fn disconnect(&self, conn: &Arc<Connection>) {
        self.logout(conn);
        self.registry.unregister(conn.token());
    }
}
