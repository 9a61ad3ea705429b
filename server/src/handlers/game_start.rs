//! Room start barrier
//!
//! Every participant of a song (the room members holding that song) sends
//! a start request. Each request records the sender as ready and then polls
//! the whole party: the request that finds everyone ready releases the
//! start. Nothing ever blocks waiting for the others.
//!
//! The poll reads one connection at a time under that connection's lock, so
//! two last requests arriving together can both see a full party. The room
//! transition in [`Storage::begin_song`](crate::storage::Storage::begin_song)
//! decides between them: only the caller that moves the room to playing
//! sends the start signal.

use crate::connection::{GameStart, PlayerSlot};
use crate::dispatcher::{Handler, HandlerContext};
use crate::error::{HandlerError, StorageError};
use crate::facade::Server;
use crate::room::RoomId;
use crate::storage::SongId;
use crate::utils::get_timestamp;
use log::{debug, info};
use shared::{AllowStart, GameStartRequest, Packet};

pub struct GameStartHandler {
    request: GameStartRequest,
}

impl GameStartHandler {
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::GameStartRequest(request) => Some(Self { request }),
            _ => None,
        }
    }

    fn game_start(&mut self) -> GameStart {
        let request = &mut self.request;
        GameStart {
            players: [
                PlayerSlot {
                    feet: request.first_player_feet,
                    difficulty: request.first_player_difficulty,
                    options: std::mem::take(&mut request.first_player_options),
                    progress: Vec::new(),
                },
                PlayerSlot {
                    feet: request.second_player_feet,
                    difficulty: request.second_player_difficulty,
                    options: std::mem::take(&mut request.second_player_options),
                    progress: Vec::new(),
                },
            ],
            song_options: std::mem::take(&mut request.song_options),
            course_title: std::mem::take(&mut request.course_title),
            requested_at: get_timestamp(),
            start_at: None,
        }
    }
}

impl Handler for GameStartHandler {
    fn requires_room(&self) -> bool {
        true
    }

    fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let Some(room) = ctx.room else {
            return Ok(());
        };
        let song = ctx.storage().find_or_create_song(
            &self.request.song_title,
            &self.request.song_subtitle,
            &self.request.song_artist,
        );

        let game = self.game_start();
        let recorded = ctx.conn.with_session(|s| {
            if s.room != Some(room) {
                return false;
            }
            s.song = Some(song.id);
            s.ready = true;
            s.game = Some(game);
            true
        });
        if !recorded {
            return Ok(());
        }

        debug!(
            "'{}' is ready to play {} in room #{}",
            ctx.user_name(),
            song.fullname(),
            room
        );
        poll_barrier(ctx.server, room, song.id)?;
        Ok(())
    }
}

/// Starts `song` in `room` if every participant is ready
///
/// Returns true when this call performed the release. A participant that
/// is not ready leaves the start pending until a later poll.
pub fn poll_barrier(server: &Server, room: RoomId, song: SongId) -> Result<bool, StorageError> {
    let participants = server.connections_in(room, Some(song));
    if participants.is_empty() {
        return Ok(false);
    }

    if let Some(waiting) = participants.iter().find(|conn| !conn.is_ready()) {
        debug!(
            "Song #{} in room #{} waits for {}",
            song,
            room,
            waiting.addr()
        );
        return Ok(false);
    }

    if !server.storage().begin_song(room, song)? {
        debug!("Song #{} in room #{} was already started", song, room);
        return Ok(false);
    }

    let started = release(server, room, song);
    info!(
        "Started song #{} in room #{} for {} participants",
        song, room, started
    );
    Ok(true)
}

/// Sends one common start time to every ready participant
fn release(server: &Server, room: RoomId, song: SongId) -> usize {
    let start_at = get_timestamp();
    let mut started = 0;

    for conn in server.connections_in(room, Some(song)) {
        let was_ready = conn.with_session(|s| {
            if !s.ready {
                return false;
            }
            s.ready = false;
            if let Some(game) = s.game.as_mut() {
                game.start_at = Some(start_at);
            }
            true
        });

        if was_ready {
            conn.send(AllowStart { start_at });
            started += 1;
        }
    }
    started
}
