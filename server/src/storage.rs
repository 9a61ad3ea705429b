//! Storage collaborator
//!
//! The server only needs lookup-or-create semantics from its storage, never
//! transactions. [`MemoryStorage`] keeps everything in process behind one
//! mutex, which also makes [`Storage::find_or_create_song`] and
//! [`Storage::begin_song`] atomic.

use crate::error::StorageError;
use crate::room::{Room, RoomId};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub type SongId = u32;
pub type UserId = u32;

/// Rank given to new users and room level of members without a privilege
pub const DEFAULT_LEVEL: u8 = 1;
/// Room level granted to the creator of a room
pub const OWNER_LEVEL: u8 = 10;

/// A song, identified by its title, subtitle and artist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub subtitle: String,
    pub artist: String,
}

impl Song {
    pub fn fullname(&self) -> String {
        if self.subtitle.is_empty() {
            format!("{} - {}", self.artist, self.title)
        } else {
            format!("{} - {} {}", self.artist, self.title, self.subtitle)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub password: String,
    /// Global level, used outside of rooms
    pub rank: u8,
    pub online: bool,
}

/// Persistence interface consumed by handlers
pub trait Storage: Send + Sync {
    /// Idempotent: concurrent first requests for one key yield one song
    fn find_or_create_song(&self, title: &str, subtitle: &str, artist: &str) -> Song;
    fn song(&self, id: SongId) -> Option<Song>;

    fn find_user(&self, name: &str) -> Option<User>;
    fn create_user(&self, name: &str, password: &str) -> Result<User, StorageError>;
    /// Returns false if the user already had that state, so going online
    /// claims the name for exactly one connection
    fn set_user_online(&self, id: UserId, online: bool) -> Result<bool, StorageError>;

    /// Level of a user in a room, or its global rank outside of rooms
    fn user_level(&self, id: UserId, room: Option<RoomId>) -> u8;
    fn set_room_level(&self, id: UserId, room: RoomId, level: u8) -> Result<(), StorageError>;

    fn create_room(
        &self,
        name: &str,
        description: &str,
        password: Option<&str>,
    ) -> Result<Room, StorageError>;
    fn find_room(&self, name: &str) -> Option<Room>;
    fn room(&self, id: RoomId) -> Option<Room>;
    fn rooms(&self) -> Vec<Room>;

    /// See [`Room::select_song`]
    fn select_song(&self, room: RoomId) -> Result<bool, StorageError>;
    /// See [`Room::begin_song`]; atomic with respect to concurrent callers
    fn begin_song(&self, room: RoomId, song: SongId) -> Result<bool, StorageError>;
    /// See [`Room::finish_song`]; atomic with respect to concurrent callers
    fn finish_song(&self, room: RoomId, expected: Option<SongId>) -> Result<bool, StorageError>;
}

#[derive(Default)]
struct Tables {
    songs: HashMap<(String, String, String), Song>,
    songs_by_id: HashMap<SongId, (String, String, String)>,
    users: HashMap<UserId, User>,
    user_ids: HashMap<String, UserId>,
    rooms: HashMap<RoomId, Room>,
    room_levels: HashMap<(UserId, RoomId), u8>,
    next_song_id: SongId,
    next_user_id: UserId,
    next_room_id: RoomId,
}

/// In-process [`Storage`]
#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_room<R>(
        &self,
        id: RoomId,
        f: impl FnOnce(&mut Room) -> R,
    ) -> Result<R, StorageError> {
        let mut tables = self.tables();
        tables
            .rooms
            .get_mut(&id)
            .map(f)
            .ok_or(StorageError::UnknownRoom(id))
    }
}

impl Storage for MemoryStorage {
    fn find_or_create_song(&self, title: &str, subtitle: &str, artist: &str) -> Song {
        let key = (title.to_string(), subtitle.to_string(), artist.to_string());
        let mut tables = self.tables();
        if let Some(song) = tables.songs.get(&key) {
            return song.clone();
        }

        tables.next_song_id += 1;
        let song = Song {
            id: tables.next_song_id,
            title: key.0.clone(),
            subtitle: key.1.clone(),
            artist: key.2.clone(),
        };
        debug!("Created song #{} ({})", song.id, song.fullname());
        tables.songs_by_id.insert(song.id, key.clone());
        tables.songs.insert(key, song.clone());
        song
    }

    fn song(&self, id: SongId) -> Option<Song> {
        let tables = self.tables();
        tables
            .songs_by_id
            .get(&id)
            .and_then(|key| tables.songs.get(key))
            .cloned()
    }

    fn find_user(&self, name: &str) -> Option<User> {
        let tables = self.tables();
        tables
            .user_ids
            .get(name)
            .and_then(|id| tables.users.get(id))
            .cloned()
    }

    fn create_user(&self, name: &str, password: &str) -> Result<User, StorageError> {
        let mut tables = self.tables();
        if tables.user_ids.contains_key(name) {
            return Err(StorageError::UserExists(name.to_string()));
        }

        tables.next_user_id += 1;
        let user = User {
            id: tables.next_user_id,
            name: name.to_string(),
            password: password.to_string(),
            rank: DEFAULT_LEVEL,
            online: false,
        };
        info!("Created user #{} '{}'", user.id, user.name);
        tables.user_ids.insert(user.name.clone(), user.id);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn set_user_online(&self, id: UserId, online: bool) -> Result<bool, StorageError> {
        let mut tables = self.tables();
        let user = tables
            .users
            .get_mut(&id)
            .ok_or(StorageError::UnknownUser(id))?;
        if user.online == online {
            return Ok(false);
        }
        user.online = online;
        Ok(true)
    }

    fn user_level(&self, id: UserId, room: Option<RoomId>) -> u8 {
        let tables = self.tables();
        match room {
            Some(room) => tables
                .room_levels
                .get(&(id, room))
                .copied()
                .unwrap_or(DEFAULT_LEVEL),
            None => tables.users.get(&id).map_or(0, |user| user.rank),
        }
    }

    fn set_room_level(&self, id: UserId, room: RoomId, level: u8) -> Result<(), StorageError> {
        let mut tables = self.tables();
        if !tables.users.contains_key(&id) {
            return Err(StorageError::UnknownUser(id));
        }
        if !tables.rooms.contains_key(&room) {
            return Err(StorageError::UnknownRoom(room));
        }
        tables.room_levels.insert((id, room), level);
        Ok(())
    }

    fn create_room(
        &self,
        name: &str,
        description: &str,
        password: Option<&str>,
    ) -> Result<Room, StorageError> {
        let mut tables = self.tables();
        if tables.rooms.values().any(|room| room.name == name) {
            return Err(StorageError::RoomExists(name.to_string()));
        }

        tables.next_room_id += 1;
        let room = Room::new(tables.next_room_id, name, description, password);
        info!("Created room #{} '{}'", room.id, room.name);
        tables.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    fn find_room(&self, name: &str) -> Option<Room> {
        self.tables()
            .rooms
            .values()
            .find(|room| room.name == name)
            .cloned()
    }

    fn room(&self, id: RoomId) -> Option<Room> {
        self.tables().rooms.get(&id).cloned()
    }

    fn rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.tables().rooms.values().cloned().collect();
        rooms.sort_by_key(|room| room.id);
        rooms
    }

    fn select_song(&self, room: RoomId) -> Result<bool, StorageError> {
        self.with_room(room, Room::select_song)
    }

    fn begin_song(&self, room: RoomId, song: SongId) -> Result<bool, StorageError> {
        self.with_room(room, |room| room.begin_song(song))
    }

    fn finish_song(&self, room: RoomId, expected: Option<SongId>) -> Result<bool, StorageError> {
        self.with_room(room, |room| room.finish_song(expected))
    }
}
