//! Room lifecycle
//!
//! A room cycles through `Idle -> SelectingSong -> Playing -> Idle`. Song
//! selection may happen any number of times before a start, but the move to
//! `Playing` happens once per play and only through [`Room::begin_song`],
//! which the start barrier uses as its single release point.

use crate::storage::SongId;

pub type RoomId = u32;

/// Room state as seen by clients in the room list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomStatus {
    #[default]
    Idle = 0,
    SelectingSong = 1,
    Playing = 2,
}

impl RoomStatus {
    pub fn name(self) -> &'static str {
        match self {
            RoomStatus::Idle => "idle",
            RoomStatus::SelectingSong => "selecting song",
            RoomStatus::Playing => "playing",
        }
    }
}

/// A logical play space; membership lives on the connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    pub password: Option<String>,
    status: RoomStatus,
    active_song: Option<SongId>,
}

impl Room {
    pub fn new(id: RoomId, name: &str, description: &str, password: Option<&str>) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: description.to_string(),
            password: password.filter(|p| !p.is_empty()).map(str::to_string),
            status: RoomStatus::Idle,
            active_song: None,
        }
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Song being played; only set while the room is playing
    pub fn active_song(&self) -> Option<SongId> {
        self.active_song
    }

    /// Rooms without a password accept anything
    pub fn check_password(&self, password: &str) -> bool {
        self.password.as_deref().map_or(true, |expected| expected == password)
    }

    /// Moves an idle or selecting room to song selection
    ///
    /// Returns false while a song is playing.
    pub fn select_song(&mut self) -> bool {
        if self.status == RoomStatus::Playing {
            return false;
        }
        self.status = RoomStatus::SelectingSong;
        true
    }

    /// Starts `song`, returning false if the room is already playing
    ///
    /// Exactly one caller wins per play, which is what makes the barrier
    /// release happen once even when the last participants arrive together.
    pub fn begin_song(&mut self, song: SongId) -> bool {
        if self.status == RoomStatus::Playing {
            return false;
        }
        self.status = RoomStatus::Playing;
        self.active_song = Some(song);
        true
    }

    /// Idles the room if `expected` is still what it is doing
    ///
    /// `Some(song)` ends that song's play, `None` abandons a selection.
    /// Returns false when the room is already idle or has moved on, so a
    /// caller acting on a stale read never ends somebody else's play.
    pub fn finish_song(&mut self, expected: Option<SongId>) -> bool {
        if self.status == RoomStatus::Idle || self.active_song != expected {
            return false;
        }
        self.status = RoomStatus::Idle;
        self.active_song = None;
        true
    }
}
