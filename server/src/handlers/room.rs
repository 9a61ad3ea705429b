//! Room creation, entry and exit

use crate::dispatcher::{Handler, HandlerContext};
use crate::error::{HandlerError, StorageError};
use crate::storage::{DEFAULT_LEVEL, OWNER_LEVEL};
use log::info;
use shared::{CreateRoom, EnterRoom, Packet, SystemMessage};

fn notify(ctx: &HandlerContext<'_>, message: String) {
    ctx.send(SystemMessage { message });
}

/// Creates a room and moves its creator into it as owner
pub struct CreateRoomHandler {
    request: CreateRoom,
}

impl CreateRoomHandler {
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::CreateRoom(request) => Some(Self { request }),
            _ => None,
        }
    }
}

impl Handler for CreateRoomHandler {
    fn required_level(&self) -> u8 {
        DEFAULT_LEVEL
    }

    fn on_forbidden(&self, ctx: &HandlerContext<'_>) {
        notify(ctx, "You are not allowed to create rooms".to_string());
    }

    fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let title = self.request.title.trim();
        if title.is_empty() {
            return Err(HandlerError::InvalidRequest("empty room title".to_string()));
        }
        let Some(user) = &ctx.user else {
            return Ok(());
        };

        let room = match ctx.storage().create_room(
            title,
            &self.request.description,
            Some(self.request.password.as_str()),
        ) {
            Ok(room) => room,
            Err(StorageError::RoomExists(name)) => {
                notify(ctx, format!("Room '{}' already exists", name));
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        ctx.storage().set_room_level(user.id, room.id, OWNER_LEVEL)?;
        info!("'{}' created room '{}'", user.name, room.name);
        ctx.server.join_room(ctx.conn, &room);
        ctx.server
            .broadcast(&ctx.server.lobby_connections(), ctx.server.room_list());
        Ok(())
    }
}

/// Enters a named room, or leaves the current one when `enter` is false
pub struct EnterRoomHandler {
    request: EnterRoom,
}

impl EnterRoomHandler {
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::EnterRoom(request) => Some(Self { request }),
            _ => None,
        }
    }
}

impl Handler for EnterRoomHandler {
    fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        if !self.request.enter {
            ctx.server.leave_room(ctx.conn);
            return Ok(());
        }

        let Some(room) = ctx.storage().find_room(&self.request.room_name) else {
            notify(ctx, format!("Room '{}' does not exist", self.request.room_name));
            return Ok(());
        };

        if !room.check_password(&self.request.password) {
            info!("'{}' gave a wrong password for '{}'", ctx.user_name(), room.name);
            notify(ctx, format!("Wrong password for room '{}'", room.name));
            return Ok(());
        }

        ctx.server.join_room(ctx.conn, &room);
        Ok(())
    }
}
