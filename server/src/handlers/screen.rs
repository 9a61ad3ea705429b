use crate::connection::UserStatus;
use crate::dispatcher::{Handler, HandlerContext};
use crate::error::HandlerError;
use log::debug;
use shared::{Packet, ScreenStatus};

/// Action byte sent when the client enters the room selection screen
const ROOM_SELECTION_ACTION: u8 = 7;

/// Tracks which screen the user is on
pub struct ScreenStatusHandler {
    status: ScreenStatus,
}

impl ScreenStatusHandler {
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::ScreenStatus(status) => Some(Self { status }),
            _ => None,
        }
    }
}

impl Handler for ScreenStatusHandler {
    fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let action = self.status.action;
        let Some(status) = UserStatus::from_screen_action(action) else {
            debug!("Ignoring screen action {} from '{}'", action, ctx.user_name());
            return Ok(());
        };

        ctx.conn.with_session(|s| s.status = status);
        if action == ROOM_SELECTION_ACTION {
            ctx.send(ctx.server.room_list());
        }

        if let Some(room) = ctx.room {
            ctx.server.room_message(
                room,
                &format!("{} is now in {}", ctx.user_name(), status.name()),
            );
        }
        ctx.server.send_user_list(ctx.room);
        Ok(())
    }
}
