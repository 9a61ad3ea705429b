//! In-game progress and game over

use crate::connection::Session;
use crate::dispatcher::{Handler, HandlerContext};
use crate::error::HandlerError;
use log::{debug, info};
use shared::{GameStatusUpdate, Packet};

/// Buffers a step result on the sender's player slot
pub struct GameStatusHandler {
    update: GameStatusUpdate,
}

impl GameStatusHandler {
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::GameStatusUpdate(update) => Some(Self { update }),
            _ => None,
        }
    }
}

impl Handler for GameStatusHandler {
    fn requires_room(&self) -> bool {
        true
    }

    fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let player = usize::from(self.update.player_id);
        if player > 1 {
            return Err(HandlerError::InvalidRequest(format!(
                "unknown player {}",
                self.update.player_id
            )));
        }

        let update = std::mem::take(&mut self.update);
        let buffered = ctx.conn.with_session(|s| match s.game.as_mut() {
            Some(game) if game.start_at.is_some() => {
                game.players[player].progress.push(update);
                true
            }
            _ => false,
        });
        if !buffered {
            debug!("Status update from '{}' outside of a song", ctx.user_name());
        }
        Ok(())
    }
}

/// Ends the sender's song; the room idles once nobody is playing anymore
pub struct GameOverHandler;

impl GameOverHandler {
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::GameOverNotice(_) => Some(GameOverHandler),
            _ => None,
        }
    }
}

impl Handler for GameOverHandler {
    fn requires_room(&self) -> bool {
        true
    }

    fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let Some(room) = ctx.room else {
            return Ok(());
        };

        if let Some(song) = ctx.conn.with_session(Session::end_song) {
            info!("'{}' finished song #{}", ctx.user_name(), song);
        }
        ctx.server.settle_room(room);
        Ok(())
    }
}
