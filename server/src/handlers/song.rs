//! Song selection handshake
//!
//! One member picks a song for the room; the others answer whether they
//! have it. Members that have the song become participants of its start
//! barrier.

use crate::dispatcher::{Handler, HandlerContext};
use crate::error::HandlerError;
use crate::handlers::game_start::poll_barrier;
use crate::room::RoomId;
use crate::storage::Song;
use log::{debug, info};
use shared::{ClientRequestStartGame, Packet, ServerRequestStartGame, SongUsage, SystemMessage};
use std::sync::Arc;

pub struct SongSelectionHandler {
    request: ClientRequestStartGame,
}

impl SongSelectionHandler {
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::ClientRequestStartGame(request) => Some(Self { request }),
            _ => None,
        }
    }

    fn select(
        &self,
        ctx: &HandlerContext<'_>,
        room: RoomId,
        song: &Song,
    ) -> Result<(), HandlerError> {
        if !ctx.storage().select_song(room)? {
            ctx.send(SystemMessage {
                message: "A song is already being played".to_string(),
            });
            return Ok(());
        }

        ctx.conn.with_session(|s| s.song = Some(song.id));
        info!("'{}' selected {} in room #{}", ctx.user_name(), song.fullname(), room);

        let others: Vec<_> = ctx
            .server
            .connections_in(room, None)
            .into_iter()
            .filter(|conn| !Arc::ptr_eq(conn, ctx.conn))
            .collect();
        ctx.server.broadcast(
            &others,
            ServerRequestStartGame {
                usage: SongUsage::Select as u8,
                song_title: song.title.clone(),
                song_artist: song.artist.clone(),
                song_subtitle: song.subtitle.clone(),
            },
        );
        ctx.server.room_message(
            room,
            &format!("{} selected {}", ctx.user_name(), song.fullname()),
        );
        Ok(())
    }
}

impl Handler for SongSelectionHandler {
    fn requires_room(&self) -> bool {
        true
    }

    fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let Some(room) = ctx.room else {
            return Ok(());
        };
        let usage = SongUsage::from_u8(self.request.usage).ok_or_else(|| {
            HandlerError::InvalidRequest(format!("unknown song usage {}", self.request.usage))
        })?;
        let song = ctx.storage().find_or_create_song(
            &self.request.song_title,
            &self.request.song_subtitle,
            &self.request.song_artist,
        );

        match usage {
            SongUsage::Select => self.select(ctx, room, &song)?,
            SongUsage::HasSong => {
                debug!("'{}' has {}", ctx.user_name(), song.fullname());
                ctx.conn.with_session(|s| s.song = Some(song.id));
            }
            SongUsage::MissingSong => {
                let held = ctx.conn.with_session(|s| s.end_song());
                ctx.server.room_message(
                    room,
                    &format!("{} does not have {}", ctx.user_name(), song.fullname()),
                );
                // The others may all be ready already
                if let Some(held) = held {
                    poll_barrier(ctx.server, room, held)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatchOutcome;
    use crate::handlers::testing::{start_request, Harness};
    use crate::room::RoomStatus;

    fn request(usage: SongUsage) -> ClientRequestStartGame {
        ClientRequestStartGame {
            usage: usage as u8,
            song_title: "Song".to_string(),
            song_artist: "Artist".to_string(),
            song_subtitle: String::new(),
        }
    }

    #[test]
    fn test_select_song() {
        let harness = Harness::new();
        let mut alice = harness.join("alice", "Lobby");
        let mut bob = harness.join("bob", "Lobby");
        alice.received();
        let room = alice.conn.room().unwrap();

        assert_eq!(
            harness.send(&alice, request(SongUsage::Select)),
            DispatchOutcome::Handled
        );
        assert_eq!(
            harness.server.storage().room(room).unwrap().status(),
            RoomStatus::SelectingSong
        );

        let song = harness
            .server
            .storage()
            .find_or_create_song("Song", "", "Artist");
        assert_eq!(alice.conn.with_session(|s| s.song), Some(song.id));
        assert_eq!(bob.conn.with_session(|s| s.song), None);

        let to_bob = bob.received();
        assert!(to_bob.contains(&Packet::from(ServerRequestStartGame {
            usage: SongUsage::Select as u8,
            song_title: "Song".to_string(),
            song_artist: "Artist".to_string(),
            song_subtitle: String::new(),
        })));
        assert!(!alice
            .received()
            .iter()
            .any(|packet| matches!(packet, Packet::ServerRequestStartGame(_))));
    }

    #[test]
    fn test_has_song_joins_participants() {
        let harness = Harness::new();
        let alice = harness.join("alice", "Lobby");
        let bob = harness.join("bob", "Lobby");
        let room = alice.conn.room().unwrap();

        harness.send(&alice, request(SongUsage::Select));
        harness.send(&bob, request(SongUsage::HasSong));

        let song = harness
            .server
            .storage()
            .find_or_create_song("Song", "", "Artist");
        assert_eq!(harness.server.connections_in(room, Some(song.id)).len(), 2);
    }

    #[test]
    fn test_missing_song_releases_ready_members() {
        let harness = Harness::new();
        let mut alice = harness.join("alice", "Lobby");
        let bob = harness.join("bob", "Lobby");

        harness.send(&alice, request(SongUsage::Select));
        harness.send(&bob, request(SongUsage::HasSong));
        harness.send(&alice, start_request("Song"));
        assert!(alice.conn.is_ready());

        harness.send(&bob, request(SongUsage::MissingSong));
        assert_eq!(bob.conn.with_session(|s| s.song), None);
        assert!(!alice.conn.is_ready());
        assert!(alice
            .received()
            .iter()
            .any(|packet| matches!(packet, Packet::AllowStart(_))));
    }

    #[test]
    fn test_select_while_playing_is_refused() {
        let harness = Harness::new();
        let mut alice = harness.join("alice", "Lobby");
        harness.send(&alice, start_request("Song"));
        alice.received();

        harness.send(&alice, request(SongUsage::Select));
        assert!(alice.received().contains(&Packet::from(SystemMessage {
            message: "A song is already being played".to_string(),
        })));
    }

    #[test]
    fn test_unknown_usage_is_a_fault() {
        let harness = Harness::new();
        let alice = harness.join("alice", "Lobby");
        let mut bad = request(SongUsage::Select);
        bad.usage = 9;
        assert_eq!(harness.send(&alice, bad), DispatchOutcome::HandlerFault);
    }

    #[test]
    fn test_requires_room() {
        let harness = Harness::new();
        let alice = harness.login("alice");
        assert_eq!(
            harness.send(&alice, request(SongUsage::Select)),
            DispatchOutcome::RoomRequired
        );
    }
}
